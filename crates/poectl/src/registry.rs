//! Startup-probed port registry.
//!
//! The chip only reports how many ports it has through its identification
//! byte, so the registry probes once at startup and owns exactly that many
//! per-port handles. Handles share the controller, and with it the lock
//! that serializes bus transactions.

use std::sync::Arc;

use log::info;

use poe_pse::regs::{PORT_SLOTS, PSE_ID};
use poe_pse::{PortIo, PortMode, PseController};

use crate::error::{CtlError, CtlResult};

/// Owned set of per-port handles, sized to the probed port count.
#[derive(Debug)]
pub struct PortRegistry<IO> {
    ctl: Arc<PseController<IO>>,
    ports: Vec<PoePort<IO>>,
}

impl<IO: PortIo> PortRegistry<IO> {
    /// Probes the controller's identification byte and builds a handle for
    /// every discovered port.
    pub fn probe(ctl: PseController<IO>) -> CtlResult<Self> {
        let ctl = Arc::new(ctl);
        let id = ctl.device_id()?;
        let count = match id {
            PSE_ID => PORT_SLOTS,
            other => return Err(CtlError::UnknownDevice { id: other }),
        };
        info!("PSE device {id:#04x}: {count} ports");

        let ports = (0..count)
            .map(|index| PoePort {
                ctl: Arc::clone(&ctl),
                index,
            })
            .collect();
        Ok(Self { ctl, ports })
    }

    /// Number of ports the probe discovered.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Handle for one port; indices beyond the probed count are rejected.
    pub fn port(&self, port: u8) -> CtlResult<&PoePort<IO>> {
        self.ports
            .get(port as usize)
            .ok_or(CtlError::PortOutOfRange {
                port,
                count: self.ports.len() as u8,
            })
    }

    /// All ports, in index order.
    pub fn ports(&self) -> impl Iterator<Item = &PoePort<IO>> {
        self.ports.iter()
    }

    /// Re-reads the identification byte.
    pub fn device_id(&self) -> CtlResult<u8> {
        Ok(self.ctl.device_id()?)
    }
}

/// Handle to one PoE port.
#[derive(Debug)]
pub struct PoePort<IO> {
    ctl: Arc<PseController<IO>>,
    index: u8,
}

impl<IO: PortIo> PoePort<IO> {
    /// Logical port index.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Whether the port is delivering power.
    pub fn state(&self) -> CtlResult<bool> {
        Ok(self.ctl.port_state(self.index)?)
    }

    /// Switches power delivery.
    pub fn set_state(&self, on: bool) -> CtlResult<()> {
        Ok(self.ctl.set_port_state(self.index, on)?)
    }

    /// Reads the operating mode.
    pub fn mode(&self) -> CtlResult<PortMode> {
        Ok(self.ctl.port_mode(self.index)?)
    }

    /// Sets the operating mode and its dependent enables.
    pub fn set_mode(&self, mode: PortMode) -> CtlResult<()> {
        Ok(self.ctl.set_port_mode(self.index, mode)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poe_pse::regs::SMBUS_BASE;
    use poe_pse::sim::SimBus;
    use poe_pse::SmbusHost;

    fn controller(sim: &SimBus) -> PseController<SimBus> {
        PseController::new(SmbusHost::new(sim.clone(), SMBUS_BASE))
    }

    #[test]
    fn test_probe_sizes_registry_from_device_id() {
        let sim = SimBus::new();
        let registry = PortRegistry::probe(controller(&sim)).unwrap();
        assert_eq!(registry.port_count(), 4);
    }

    #[test]
    fn test_probe_rejects_unknown_device() {
        let sim = SimBus::new();
        sim.set_device_id(0x21);
        let err = PortRegistry::probe(controller(&sim)).unwrap_err();
        assert!(matches!(err, CtlError::UnknownDevice { id: 0x21 }));
    }

    #[test]
    fn test_port_lookup_is_bounded() {
        let sim = SimBus::new();
        let registry = PortRegistry::probe(controller(&sim)).unwrap();

        assert_eq!(registry.port(3).unwrap().index(), 3);
        assert!(matches!(
            registry.port(4).unwrap_err(),
            CtlError::PortOutOfRange { port: 4, count: 4 }
        ));
    }

    #[test]
    fn test_handles_reach_the_chip() {
        let sim = SimBus::new();
        let registry = PortRegistry::probe(controller(&sim)).unwrap();

        registry.port(2).unwrap().set_mode(PortMode::Auto).unwrap();
        assert_eq!(registry.port(2).unwrap().mode().unwrap(), PortMode::Auto);
    }
}
