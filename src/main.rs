//! The main entry point for the `streplace` command-line application.
//!
//! Parses the command line, installs logging on stderr and runs the
//! replacement. Exits with 1 on any error, 2 on usage errors.

use anyhow::Result;
use std::io;
use std::process::ExitCode;
use streplace::cli;
use streplace::replacer;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Library errors already name their cause.
            eprintln!("streplace: {e}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let args = cli::parse_args();
    let invocation = args.into_invocation()?;
    replacer::run_replace(invocation.rules, invocation.config, &invocation.roots)?;
    Ok(())
}

/// Logs to stderr, filtered by `STREPLACE_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("STREPLACE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
