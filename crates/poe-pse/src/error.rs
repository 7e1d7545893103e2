//! Error types for the PSE driver stack.

use std::fmt;

use thiserror::Error;

/// Polling phase of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusPhase {
    /// Draining stale host state, waiting for the idle-ready sentinel.
    Idle,
    /// Waiting for an issued transaction to reach the completion sentinel.
    Transfer,
}

impl fmt::Display for BusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusPhase::Idle => "idle wait",
            BusPhase::Transfer => "transfer wait",
        })
    }
}

/// Errors surfaced by the PSE driver.
#[derive(Error, Debug)]
pub enum PseError {
    /// A polling phase missed its sentinel within the timeout budget.
    #[error("SMBus host busy during {phase}")]
    Busy { phase: BusPhase },

    /// A 2-bit mode encoding the driver does not operate in.
    #[error("unsupported mode encoding {bits:#04b}")]
    InvalidMode { bits: u8 },

    /// Port index outside the chip's four field slots.
    #[error("port {port} exceeds the controller's 4 port slots")]
    InvalidPort { port: u8 },

    /// The I/O-port capability could not be acquired.
    #[error("I/O port access: {0}")]
    Io(#[from] std::io::Error),
}

impl PseError {
    /// Errno-style negative code for integer-facing consumers.
    pub fn code(&self) -> i32 {
        match self {
            PseError::Busy { .. } => -libc::EBUSY,
            PseError::InvalidMode { .. } | PseError::InvalidPort { .. } => -libc::EINVAL,
            PseError::Io(_) => -libc::EIO,
        }
    }
}

/// Result type for PSE driver operations.
pub type PseResult<T> = std::result::Result<T, PseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PseError::Busy {
            phase: BusPhase::Idle,
        };
        assert_eq!(err.to_string(), "SMBus host busy during idle wait");

        let err = PseError::InvalidMode { bits: 0b10 };
        assert_eq!(err.to_string(), "unsupported mode encoding 0b10");
    }

    #[test]
    fn test_error_codes() {
        let busy = PseError::Busy {
            phase: BusPhase::Transfer,
        };
        assert_eq!(busy.code(), -16);
        assert_eq!(PseError::InvalidMode { bits: 0 }.code(), -22);
        assert_eq!(PseError::InvalidPort { port: 9 }.code(), -22);
    }
}
