//! Per-port operation set over the PSE chip's packed registers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::error::{PseError, PseResult};
use crate::io::PortIo;
use crate::regs::{self, PortMode, Register};
use crate::smbus::SmbusHost;

/// Driver for the quad-port PSE controller.
///
/// Owns the transaction engine behind a mutex; every public operation takes
/// the lock once and holds it across its whole read/compute/write sequence,
/// so at most one transaction sequence is in flight system-wide. The lock
/// prevents interleaving only: a composite operation that fails partway
/// (see [`set_port_mode`](Self::set_port_mode)) leaves its earlier writes in
/// effect, and recovery belongs to the caller.
#[derive(Debug)]
pub struct PseController<IO> {
    bus: Mutex<SmbusHost<IO>>,
    dev_addr: u8,
    timeout_units: u32,
}

impl<IO: PortIo> PseController<IO> {
    /// Creates a controller over `bus` with the default timeout budget.
    pub fn new(bus: SmbusHost<IO>) -> Self {
        Self {
            bus: Mutex::new(bus),
            dev_addr: regs::PSE_ADDR,
            timeout_units: regs::DEFAULT_TIMEOUT_UNITS,
        }
    }

    /// Overrides the per-transaction timeout budget, in polling units.
    pub fn with_timeout(mut self, units: u32) -> Self {
        self.timeout_units = units;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SmbusHost<IO>> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_port(port: u8) -> PseResult<()> {
        if port >= regs::PORT_SLOTS {
            return Err(PseError::InvalidPort { port });
        }
        Ok(())
    }

    fn read_reg(&self, bus: &mut SmbusHost<IO>, reg: Register) -> PseResult<u8> {
        bus.read_byte(self.dev_addr, reg.code(), self.timeout_units)
    }

    fn write_reg(&self, bus: &mut SmbusHost<IO>, reg: Register, value: u8) -> PseResult<()> {
        bus.write_byte(self.dev_addr, reg.code(), value, self.timeout_units)
    }

    /// Reads the chip's identification byte.
    pub fn device_id(&self) -> PseResult<u8> {
        let mut bus = self.lock();
        self.read_reg(&mut bus, Register::DeviceId)
    }

    /// Whether `port` is currently delivering power.
    pub fn port_state(&self, port: u8) -> PseResult<bool> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        let status = self.read_reg(&mut bus, Register::PowerStatus)?;
        Ok(status & (1 << port) != 0)
    }

    /// Switches power delivery for `port`.
    pub fn set_port_state(&self, port: u8, on: bool) -> PseResult<()> {
        Self::check_port(port)?;
        debug!("pse: port {port} power {}", if on { "on" } else { "off" });
        let mut bus = self.lock();
        // The chip wants a status read to precede a push-button write; the
        // value itself is not used.
        self.read_reg(&mut bus, Register::PowerStatus)?;
        let mut data: u8 = 1 << port;
        if !on {
            data = !data;
        }
        // Low nibble: power-on mask. High nibble: power-off mask, the
        // complement of whatever the low nibble ended up as.
        data |= !data << 4;
        self.write_reg(&mut bus, Register::PowerEnable, data)
    }

    /// Raw 2-bit mode field for one slot. Used by the packed rebuild so
    /// sibling slots keep whatever encoding they hold, decodable or not.
    fn mode_field(&self, bus: &mut SmbusHost<IO>, port: u8) -> PseResult<u8> {
        let modes = self.read_reg(bus, Register::OperatingMode)?;
        Ok((modes >> PortMode::shift(port)) & PortMode::FIELD_MASK)
    }

    /// Reads `port`'s operating mode.
    pub fn port_mode(&self, port: u8) -> PseResult<PortMode> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        let bits = self.mode_field(&mut bus, port)?;
        PortMode::from_bits(bits).ok_or(PseError::InvalidMode { bits })
    }

    /// Sets `port`'s operating mode and drives its detection,
    /// classification and sensing enables to `mode == Auto`.
    ///
    /// The packed mode byte is rebuilt from the chip: one re-read per
    /// sibling slot, then a single write covering all four slots. The three
    /// enable writes that follow are independent; a failure partway leaves
    /// the earlier writes in effect.
    pub fn set_port_mode(&self, port: u8, mode: PortMode) -> PseResult<()> {
        Self::check_port(port)?;
        debug!("pse: port {port} mode {mode}");
        let auto = mode == PortMode::Auto;
        let mut bus = self.lock();

        let mut modes = 0u8;
        for slot in 0..regs::PORT_SLOTS {
            let bits = if slot == port {
                mode.as_bits()
            } else {
                self.mode_field(&mut bus, slot)?
            };
            modes |= bits << PortMode::shift(slot);
        }
        self.write_reg(&mut bus, Register::OperatingMode, modes)?;

        self.set_detection_locked(&mut bus, port, auto)?;
        self.set_classification_locked(&mut bus, port, auto)?;
        self.set_sensing_locked(&mut bus, port, auto)
    }

    /// [`set_port_mode`](Self::set_port_mode) for integer-facing callers:
    /// rejects encodings other than manual and auto before any register
    /// access.
    pub fn set_port_mode_raw(&self, port: u8, bits: u8) -> PseResult<()> {
        let mode = PortMode::from_bits(bits).ok_or(PseError::InvalidMode { bits })?;
        self.set_port_mode(port, mode)
    }

    fn set_detection_locked(
        &self,
        bus: &mut SmbusHost<IO>,
        port: u8,
        on: bool,
    ) -> PseResult<()> {
        let mut detect = self.read_reg(bus, Register::DetectClassEnable)?;
        if on {
            detect |= 1 << port;
        } else {
            detect &= !(1 << port);
        }
        self.write_reg(bus, Register::DetectClassEnable, detect)
    }

    fn set_classification_locked(
        &self,
        bus: &mut SmbusHost<IO>,
        port: u8,
        on: bool,
    ) -> PseResult<()> {
        let mut class = self.read_reg(bus, Register::DetectClassEnable)?;
        if on {
            class |= 1 << (port + 4);
        } else {
            class &= !(1 << (port + 4));
        }
        self.write_reg(bus, Register::DetectClassEnable, class)
    }

    fn set_sensing_locked(&self, bus: &mut SmbusHost<IO>, port: u8, on: bool) -> PseResult<()> {
        let mut sense = self.read_reg(bus, Register::DisconnectEnable)?;
        // Upper nibble is reserved and never written back.
        sense &= 0x0F;
        if on {
            sense |= 1 << port;
        } else {
            sense &= !(1 << port);
        }
        self.write_reg(bus, Register::DisconnectEnable, sense)
    }

    /// Enables or disables detection for `port`.
    pub fn set_port_detection(&self, port: u8, on: bool) -> PseResult<()> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        self.set_detection_locked(&mut bus, port, on)
    }

    /// Enables or disables classification for `port`.
    pub fn set_port_classification(&self, port: u8, on: bool) -> PseResult<()> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        self.set_classification_locked(&mut bus, port, on)
    }

    /// Enables or disables current sensing for `port`.
    pub fn set_port_sensing(&self, port: u8, on: bool) -> PseResult<()> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        self.set_sensing_locked(&mut bus, port, on)
    }

    /// Whether detection is enabled for `port`.
    pub fn port_detection(&self, port: u8) -> PseResult<bool> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        let detect = self.read_reg(&mut bus, Register::DetectClassEnable)?;
        Ok(detect & (1 << port) != 0)
    }

    /// Whether classification is enabled for `port`.
    pub fn port_classification(&self, port: u8) -> PseResult<bool> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        let class = self.read_reg(&mut bus, Register::DetectClassEnable)?;
        Ok(class & (1 << (port + 4)) != 0)
    }

    /// Whether current sensing is enabled for `port`.
    pub fn port_sensing(&self, port: u8) -> PseResult<bool> {
        Self::check_port(port)?;
        let mut bus = self.lock();
        let sense = self.read_reg(&mut bus, Register::DisconnectEnable)?;
        Ok(sense & (1 << port) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::SMBUS_BASE;
    use crate::sim::SimBus;
    use pretty_assertions::assert_eq;

    fn setup() -> (SimBus, PseController<SimBus>) {
        let sim = SimBus::new();
        let ctl = PseController::new(SmbusHost::new(sim.clone(), SMBUS_BASE));
        (sim, ctl)
    }

    #[test]
    fn test_device_id() {
        let (_sim, ctl) = setup();
        assert_eq!(ctl.device_id().unwrap(), 0x44);
    }

    #[test]
    fn test_power_enable_byte_encoding() {
        let (sim, ctl) = setup();

        ctl.set_port_state(2, true).unwrap();
        assert_eq!(
            sim.device_writes().last(),
            Some(&(Register::PowerEnable.code(), 0xB4))
        );

        ctl.set_port_state(2, false).unwrap();
        assert_eq!(
            sim.device_writes().last(),
            Some(&(Register::PowerEnable.code(), 0xFB))
        );
    }

    #[test]
    fn test_out_of_range_port_is_rejected_without_bus_traffic() {
        let (sim, ctl) = setup();

        assert!(matches!(
            ctl.port_state(4).unwrap_err(),
            PseError::InvalidPort { port: 4 }
        ));
        assert!(matches!(
            ctl.set_port_state(4, true).unwrap_err(),
            PseError::InvalidPort { port: 4 }
        ));
        assert!(matches!(
            ctl.set_port_mode(7, PortMode::Auto).unwrap_err(),
            PseError::InvalidPort { port: 7 }
        ));
        assert!(sim.device_writes().is_empty());
    }

    #[test]
    fn test_sensing_clears_reserved_nibble() {
        let (sim, ctl) = setup();
        sim.set_chip_reg(Register::DisconnectEnable, 0xA2);

        ctl.set_port_sensing(0, true).unwrap();

        assert_eq!(sim.chip_reg(Register::DisconnectEnable), 0x03);
    }

    #[test]
    fn test_mode_rebuild_preserves_undecodable_sibling_fields() {
        let (sim, ctl) = setup();
        // Slots 0..4 hold auto, manual, off, semi-auto.
        sim.set_chip_reg(Register::OperatingMode, 0b10_00_01_11);

        ctl.set_port_mode(1, PortMode::Auto).unwrap();

        assert_eq!(sim.chip_reg(Register::OperatingMode), 0b10_00_11_11);
    }

    #[test]
    fn test_mode_change_failure_leaves_earlier_writes() {
        let (sim, ctl) = setup();
        sim.set_chip_reg(Register::OperatingMode, 0b01_01_01_01);
        // Mode write lands, the detection write that follows does not.
        sim.vanish_after_writes(1);

        let err = ctl.set_port_mode(0, PortMode::Auto).unwrap_err();

        assert!(matches!(err, PseError::Busy { .. }));
        assert_eq!(sim.chip_reg(Register::OperatingMode), 0b01_01_01_11);
        assert_eq!(sim.chip_reg(Register::DetectClassEnable), 0x00);
    }

    #[test]
    fn test_failed_read_aborts_before_any_write() {
        let (sim, ctl) = setup();
        sim.vanish();

        ctl.set_port_detection(1, true).unwrap_err();

        assert!(sim.device_writes().is_empty());
    }
}
