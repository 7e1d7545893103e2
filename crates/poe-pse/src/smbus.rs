//! SMBus host transaction engine.
//!
//! The host controller is an ICH-compatible block of six byte registers in
//! I/O space. One transaction moves a single byte to or from a command
//! register of an addressed device, in two polled phases:
//!
//! 1. **Drain**: acknowledge any latched done/failed state a previous
//!    transaction left behind, clear the status register, and poll until the
//!    host reads exactly the idle-ready sentinel.
//! 2. **Transfer**: program slave address, command and (for writes) data,
//!    kick the start code, and poll until the host reads exactly the
//!    completion sentinel.
//!
//! Either phase fails `Busy` when the device-error bit comes up or the
//! iteration budget runs out. There is no retry here; retry policy belongs
//! to the caller. Polling is a bounded busy-wait, never a blocking
//! primitive, so a transaction cannot be cancelled once started.

use log::{trace, warn};

use crate::error::{BusPhase, PseError, PseResult};
use crate::io::PortIo;

// Host register offsets from the I/O window base.
pub(crate) const SMB_HST_STS: u16 = 0x00;
pub(crate) const SMB_HST_CNT: u16 = 0x02;
pub(crate) const SMB_HST_CMD: u16 = 0x03;
pub(crate) const SMB_XMIT_SLVA: u16 = 0x04;
pub(crate) const SMB_HST_DAT0: u16 = 0x05;

/// Size of the host register block, in ports.
pub const SMB_WINDOW_LEN: u16 = 6;

// HST_STS bits. The status register is write-1-to-clear.
pub(crate) const STS_BYTE_DONE: u8 = 0x80;
pub(crate) const STS_INUSE: u8 = 0x40;
pub(crate) const STS_FAILED: u8 = 0x10;
pub(crate) const STS_DEV_ERR: u8 = 0x04;
pub(crate) const STS_INTR: u8 = 0x02;
const STS_LATCHES: u8 = STS_BYTE_DONE | STS_FAILED;
const STS_CLEAR: u8 = STS_BYTE_DONE | STS_FAILED | STS_DEV_ERR;

/// Exact status of an idle host, ready to frame a transaction.
const STS_IDLE_READY: u8 = STS_INUSE;
/// Exact status after a transaction completed cleanly.
const STS_COMPLETE: u8 = STS_INUSE | STS_INTR;

// HST_CNT bits.
pub(crate) const CNT_START: u8 = 0x40;
pub(crate) const CNT_BYTE_DATA: u8 = 0x08;
pub(crate) const CNT_KILL: u8 = 0x02;
const CNT_GO: u8 = CNT_START | CNT_BYTE_DATA;

/// Poll iterations bought by one timeout unit.
const POLLS_PER_UNIT: u32 = 100;

/// Byte-transaction engine over one SMBus host block.
///
/// Holds no device state; every call is a self-contained transaction. The
/// engine itself provides no mutual exclusion: callers that share a bus
/// must serialize whole transactions (see
/// [`PseController`](crate::controller::PseController)).
#[derive(Debug)]
pub struct SmbusHost<IO> {
    io: IO,
    base: u16,
}

impl<IO: PortIo> SmbusHost<IO> {
    /// Creates an engine over the host block at `base`.
    pub fn new(io: IO, base: u16) -> Self {
        Self { io, base }
    }

    /// Writes `data` to `command` of the device at `dev_addr`.
    pub fn write_byte(
        &mut self,
        dev_addr: u8,
        command: u8,
        data: u8,
        timeout_units: u32,
    ) -> PseResult<()> {
        trace!("smbus: write dev {dev_addr:#04x} cmd {command:#04x} data {data:#04x}");
        self.drain_stale(false, timeout_units)?;
        self.io.outb(self.base + SMB_XMIT_SLVA, dev_addr);
        self.io.outb(self.base + SMB_HST_CMD, command);
        self.io.outb(self.base + SMB_HST_DAT0, data);
        self.io.outb(self.base + SMB_HST_CNT, CNT_GO);
        self.wait_complete(timeout_units)
    }

    /// Reads one byte from `command` of the device at `dev_addr`.
    pub fn read_byte(&mut self, dev_addr: u8, command: u8, timeout_units: u32) -> PseResult<u8> {
        trace!("smbus: read dev {dev_addr:#04x} cmd {command:#04x}");
        self.drain_stale(true, timeout_units)?;
        // Bit 0 of the slave address selects the read direction.
        self.io.outb(self.base + SMB_XMIT_SLVA, dev_addr + 1);
        self.io.outb(self.base + SMB_HST_CMD, command);
        self.io.outb(self.base + SMB_HST_CNT, CNT_GO);
        self.wait_complete(timeout_units)?;
        Ok(self.io.inb(self.base + SMB_HST_DAT0))
    }

    fn status(&mut self) -> u8 {
        self.io.inb(self.base + SMB_HST_STS)
    }

    /// Acknowledges the done/failed latches without disturbing a transaction
    /// that may still be mid-flight.
    fn ack_latches(&mut self, sts: u8) {
        if sts & STS_LATCHES != 0 {
            let cnt = self.io.inb(self.base + SMB_HST_CNT);
            self.io
                .outb(self.base + SMB_HST_CNT, cnt | (sts & STS_BYTE_DONE) | CNT_KILL);
        }
    }

    /// Phase one: clear leftover state and wait for the idle-ready sentinel.
    /// Reads also pre-clear the data register before polling.
    fn drain_stale(&mut self, clear_data: bool, timeout_units: u32) -> PseResult<()> {
        let mut sts = self.status();
        self.ack_latches(sts);
        self.io.outb(self.base + SMB_HST_STS, 0xFF);
        if clear_data {
            self.io.outb(self.base + SMB_HST_DAT0, 0x00);
        }

        let budget = timeout_units * POLLS_PER_UNIT;
        let mut polls = 0;
        while polls < budget {
            sts = self.status();
            self.ack_latches(sts);
            if sts & STS_CLEAR != 0 {
                self.io.outb(self.base + SMB_HST_STS, sts & STS_CLEAR);
            }
            if sts & STS_DEV_ERR != 0 || sts == STS_IDLE_READY {
                break;
            }
            polls += 1;
        }
        if sts & STS_DEV_ERR != 0 || polls >= budget {
            warn!("smbus: host stuck before transaction (status {sts:#04x})");
            return Err(PseError::Busy {
                phase: BusPhase::Idle,
            });
        }
        Ok(())
    }

    /// Phase two: wait for the issued transaction to hit the completion
    /// sentinel, acknowledging the device-error bit along the way.
    fn wait_complete(&mut self, timeout_units: u32) -> PseResult<()> {
        let budget = timeout_units * POLLS_PER_UNIT;
        let mut polls = 0;
        let mut sts = 0u8;
        while polls < budget {
            sts = self.status();
            if sts & STS_DEV_ERR != 0 {
                self.io.outb(self.base + SMB_HST_STS, STS_DEV_ERR);
            }
            if sts & STS_DEV_ERR != 0 || sts == STS_COMPLETE {
                break;
            }
            polls += 1;
        }
        if sts & STS_DEV_ERR != 0 || polls >= budget {
            warn!("smbus: transaction did not complete (status {sts:#04x})");
            return Err(PseError::Busy {
                phase: BusPhase::Transfer,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{Register, PSE_ADDR, SMBUS_BASE};
    use crate::sim::SimBus;
    use pretty_assertions::assert_eq;

    fn engine(sim: &SimBus) -> SmbusHost<SimBus> {
        SmbusHost::new(sim.clone(), SMBUS_BASE)
    }

    #[test]
    fn test_write_byte_reaches_device() {
        let sim = SimBus::new();
        let mut host = engine(&sim);

        host.write_byte(PSE_ADDR, Register::OperatingMode.code(), 0x55, 30)
            .unwrap();

        assert_eq!(sim.chip_reg(Register::OperatingMode), 0x55);
        assert_eq!(
            sim.device_writes(),
            vec![(Register::OperatingMode.code(), 0x55)]
        );
    }

    #[test]
    fn test_read_byte_returns_register() {
        let sim = SimBus::new();
        sim.set_chip_reg(Register::DetectClassEnable, 0xA3);
        let mut host = engine(&sim);

        let value = host
            .read_byte(PSE_ADDR, Register::DetectClassEnable.code(), 30)
            .unwrap();

        assert_eq!(value, 0xA3);
    }

    #[test]
    fn test_stale_latches_are_drained_first() {
        let sim = SimBus::new();
        sim.raise_latches(STS_BYTE_DONE | STS_FAILED);
        let mut host = engine(&sim);

        let id = host.read_byte(PSE_ADDR, Register::DeviceId.code(), 30).unwrap();

        assert_eq!(id, 0x44);
    }

    #[test]
    fn test_wedged_host_times_out() {
        let sim = SimBus::new();
        sim.wedge();
        let mut host = engine(&sim);

        let err = host
            .write_byte(PSE_ADDR, Register::PowerEnable.code(), 0x01, 1)
            .unwrap_err();

        assert!(matches!(
            err,
            PseError::Busy {
                phase: BusPhase::Idle
            }
        ));
        assert!(sim.device_writes().is_empty());
    }

    #[test]
    fn test_absent_device_fails_transfer() {
        let sim = SimBus::new();
        sim.vanish();
        let mut host = engine(&sim);

        let err = host
            .read_byte(PSE_ADDR, Register::DeviceId.code(), 30)
            .unwrap_err();

        assert!(matches!(
            err,
            PseError::Busy {
                phase: BusPhase::Transfer
            }
        ));
    }

    #[test]
    fn test_host_recovers_after_device_error() {
        let sim = SimBus::new();
        sim.vanish();
        let mut host = engine(&sim);
        host.read_byte(PSE_ADDR, Register::DeviceId.code(), 30)
            .unwrap_err();

        sim.reappear();
        let id = host.read_byte(PSE_ADDR, Register::DeviceId.code(), 30).unwrap();

        assert_eq!(id, 0x44);
    }
}
