use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `DUET_LOG=duet=debug`
pub const LOG_ENV: &str = "DUET_LOG";

/// Send `tracing` output to the log file under the duet home.
/// The terminal belongs to the TUI, so nothing is written to stdout or stderr.
pub fn init(config: &Config) -> Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {e}"))?;

    tracing::info!(log = %path.display(), "logging initialised");
    Ok(())
}
