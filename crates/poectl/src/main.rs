//! poectl entry point.

use std::process::ExitCode;

use clap::Parser;

use poectl::Cli;

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
fn main() -> ExitCode {
    use log::{error, info};
    use poe_pse::smbus::SMB_WINDOW_LEN;
    use poe_pse::IoPorts;
    use poectl::CtlError;

    fn failure_code(err: &CtlError) -> ExitCode {
        ExitCode::from((-err.code()).clamp(1, 255) as u8)
    }

    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&cli.log_level),
    )
    .init();

    info!(
        "poectl: SMBus host at {:#06x}, timeout {} units",
        cli.smbus_base, cli.timeout
    );

    // The six-byte host register block is the only I/O this process touches.
    let io = match unsafe { IoPorts::request(cli.smbus_base, SMB_WINDOW_LEN) } {
        Ok(io) => io,
        Err(e) => {
            error!("cannot map SMBus host window at {:#06x}: {e}", cli.smbus_base);
            return failure_code(&CtlError::from(e));
        }
    };

    match poectl::run_tool(&cli, io) {
        Ok(out) => {
            if !out.is_empty() {
                println!("{out}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            failure_code(&e)
        }
    }
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
fn main() -> ExitCode {
    let _ = Cli::parse();
    eprintln!("poectl drives x86 I/O ports; this build target has no SMBus host window");
    ExitCode::FAILURE
}
