//! Error types for poectl.

use thiserror::Error;

use poe_pse::PseError;

/// Errors surfaced by the control tool.
#[derive(Error, Debug)]
pub enum CtlError {
    /// The probe found a chip this tool does not know how to drive.
    #[error("unsupported PSE device id {id:#04x}")]
    UnknownDevice { id: u8 },

    /// Port index beyond the probed port count.
    #[error("port {port} out of range (device has {count} ports)")]
    PortOutOfRange { port: u8, count: u8 },

    /// Driver-level failure.
    #[error(transparent)]
    Pse(#[from] PseError),
}

impl CtlError {
    /// Errno-style negative code, used as the process exit status.
    pub fn code(&self) -> i32 {
        match self {
            CtlError::UnknownDevice { .. } => -libc::ENXIO,
            CtlError::PortOutOfRange { .. } => -libc::EINVAL,
            CtlError::Pse(e) => e.code(),
        }
    }
}

/// Result type for control tool operations.
pub type CtlResult<T> = std::result::Result<T, CtlError>;

#[cfg(test)]
mod tests {
    use super::*;
    use poe_pse::BusPhase;

    #[test]
    fn test_error_display() {
        let err = CtlError::UnknownDevice { id: 0x21 };
        assert_eq!(err.to_string(), "unsupported PSE device id 0x21");

        let err = CtlError::PortOutOfRange { port: 9, count: 4 };
        assert_eq!(err.to_string(), "port 9 out of range (device has 4 ports)");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CtlError::UnknownDevice { id: 0 }.code(), -6);
        assert_eq!(CtlError::PortOutOfRange { port: 9, count: 4 }.code(), -22);
        let busy = CtlError::from(PseError::Busy {
            phase: BusPhase::Idle,
        });
        assert_eq!(busy.code(), -16);
    }
}
