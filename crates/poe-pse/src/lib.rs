//! Driver for the quad-port PoE PSE controller on the switch management bus.
//!
//! The controller chip hangs off an ICH-compatible SMBus host reached
//! through x86 I/O ports. This crate provides:
//!
//! - [`io`]: the narrow `{inb, outb}` capability seam, with the
//!   hardware-backed [`io::IoPorts`] and the fully safe [`sim::SimBus`]
//! - [`smbus`]: the single-byte transaction engine with its busy-clearing
//!   and sentinel-polling protocol
//! - [`regs`]: the chip's register map and field encodings
//! - [`controller`]: the per-port operation set over shared, multi-port
//!   packed registers, serialized behind one lock
//!
//! The chip packs several ports into each register byte, so every setter is
//! a read-modify-write that must leave sibling ports' bits untouched.
//! Composite operations (a mode change touches four registers) are
//! serialized against other callers but are not atomic against partial
//! failure; callers re-issue or read back to reconcile.
//!
//! # Example
//!
//! ```
//! use poe_pse::sim::SimBus;
//! use poe_pse::{PortMode, PseController, SmbusHost};
//!
//! let ctl = PseController::new(SmbusHost::new(SimBus::new(), poe_pse::regs::SMBUS_BASE));
//! ctl.set_port_mode(0, PortMode::Auto).unwrap();
//! assert_eq!(ctl.port_mode(0).unwrap(), PortMode::Auto);
//! assert!(ctl.port_detection(0).unwrap());
//! ```

pub mod controller;
pub mod error;
pub mod io;
pub mod regs;
pub mod sim;
pub mod smbus;

pub use controller::PseController;
pub use error::{BusPhase, PseError, PseResult};
pub use io::PortIo;
pub use regs::{PortMode, Register};
pub use smbus::SmbusHost;

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
pub use io::IoPorts;
