//! Logging setup.
//!
//! Log lines are the primary progress and error channel of every stage, so
//! the binary installs a subscriber before doing anything else. `RUST_LOG`
//! takes precedence over the `--verbose` flag.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber writing to stderr.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("issuepipe={default_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
