//! Logging setup

use std::str::FromStr;
use tracing::Level;

/// Install the global `fmt` subscriber at `level` (`error`..`trace`)
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let level = Level::from_str(level)
        .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise tracing: {}", e))
}
