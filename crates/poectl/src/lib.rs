//! Command-line control surface for the switch PoE PSE controller.
//!
//! `poectl` is the userspace owner of the PSE chip: it probes the controller
//! once at startup, builds a registry sized to the discovered port count,
//! and exposes each port's power state and operating mode as commands.
//!
//! # Responsibilities
//!
//! - Probe the identification byte and size the port registry from it
//! - Parse written attribute values (`on`/`off`, `manual`/`auto`) and format
//!   read values; the driver crate never sees strings
//! - Map driver errors to errno-style process exit codes
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//!
//! let cli = poectl::Cli::parse();
//! let io = unsafe { poe_pse::IoPorts::request(cli.smbus_base, 6)? };
//! println!("{}", poectl::run_tool(&cli, io)?);
//! ```

pub mod cli;
pub mod error;
pub mod registry;

pub use cli::{Cli, Command};
pub use error::{CtlError, CtlResult};
pub use registry::{PoePort, PortRegistry};

use poe_pse::{PortIo, PseController, SmbusHost};

/// Builds the controller stack over `io`, probes it, and dispatches one
/// command. Returns the text to print.
pub fn run_tool<IO: PortIo>(cli: &Cli, io: IO) -> CtlResult<String> {
    let ctl = PseController::new(SmbusHost::new(io, cli.smbus_base)).with_timeout(cli.timeout);
    let registry = PortRegistry::probe(ctl)?;
    cli::run(&cli.command, &registry)
}
