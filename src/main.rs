//! huebridge binary entry point.

use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use huebridge::cli::{Cli, execute};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = execute(&cli)?;
    if !output.is_empty() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

/// Logs go to stderr; stdout carries command output and, for `worker`,
/// protocol frames.
fn init_tracing(verbose: bool) {
    let default = if verbose { "huebridge=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("HUEBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
