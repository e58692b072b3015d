//! Subscriber setup for applications embedding the driver.
//!
//! The driver itself only emits `tracing` events inside the span it was built
//! with. Installing a subscriber is left to the application; this module offers
//! the usual one.

use crate::config::ApplicationConfig;
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Output format for [`init_from_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines with ANSI colors.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Build the event filter: `RUST_LOG` when set, else the configured level.
pub fn build_filter(config: &ApplicationConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level '{}'", config.log_level)),
    }
}

/// Install a global fmt subscriber for the application.
///
/// Fails if a global subscriber is already set.
pub fn init_from_config(config: &ApplicationConfig, format: LogFormat) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    tracing::info!(app = %config.name, level = %config.log_level, "Logging initialized");
    Ok(())
}
