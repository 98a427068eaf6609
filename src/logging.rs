//! Tracing subscriber setup for the binary.
//!
//! Logs go to stderr so stdout stays free for command output (`pixelbeam list`).
//! `RUST_LOG`, when set, replaces the configured filter.

use crate::config::{LogConfig, LogFormat};
use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the filter: `RUST_LOG` if present and valid, else `config.level`, else `info`.
///
/// # Errors
/// Only if even the `info` fallback cannot be parsed.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow!("invalid log level: {e}"))
}

/// Install the global subscriber.
///
/// # Errors
/// Invalid filter, or a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Console => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(false))
            .try_init(),
    }
    .map_err(|e| anyhow!("logging already initialised: {e}"))
}
