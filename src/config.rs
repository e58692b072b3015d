//! Driver configuration using Figment
//!
//! Configuration is layered, lowest precedence first:
//! 1. Built-in defaults (every field has one)
//! 2. A TOML file, when given
//! 3. Environment variables prefixed with `RUST_DMM_`
//!
//! # Environment Variable Overrides
//!
//! Nesting levels are separated by a double underscore:
//!
//! ```text
//! RUST_DMM_APPLICATION__LOG_LEVEL=debug
//! RUST_DMM_SERIAL__PORT=/dev/ttyUSB0
//! RUST_DMM_SERIAL__BAUD_RATE=19200
//! RUST_DMM_FETCH__MAX_ATTEMPTS=5
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rust_dmm::config::DmmConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = DmmConfig::load_from("config/dmm.toml")?;
//!     println!("Port: {:?}", config.serial.port);
//!     println!("Fetch attempts: {}", config.fetch.max_attempts);
//!     Ok(())
//! }
//! ```

use crate::instrument::fetch::FetchPolicy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values loaded but are not usable.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level driver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DmmConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Identity check settings
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Robust fetch tuning
    #[serde(default)]
    pub fetch: FetchPolicy,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to open when `connect` is called without an override
    #[serde(default)]
    pub port: Option<String>,
    /// Host-side baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Pause after opening the port, in milliseconds
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Pause after a live baud change, in milliseconds
    #[serde(default = "default_baud_settle")]
    pub baud_settle_ms: u64,
    /// Wait for an echo after a plain command, in milliseconds
    #[serde(default = "default_echo_timeout")]
    pub echo_timeout_ms: u64,
    /// Pause between `*RST` and closing the port, in milliseconds
    #[serde(default = "default_close_pause")]
    pub close_pause_ms: u64,
}

/// Identity check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Case-insensitive regex the `*IDN?` reply must match
    #[serde(default = "default_model_pattern")]
    pub model_pattern: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "rust_dmm".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout() -> u64 {
    1500
}

fn default_settle() -> u64 {
    200
}

fn default_baud_settle() -> u64 {
    1000
}

fn default_echo_timeout() -> u64 {
    100
}

fn default_close_pause() -> u64 {
    50
}

fn default_model_pattern() -> String {
    r"2831\s*E".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout(),
            settle_ms: default_settle(),
            baud_settle_ms: default_baud_settle(),
            echo_timeout_ms: default_echo_timeout(),
            close_pause_ms: default_close_pause(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            model_pattern: default_model_pattern(),
        }
    }
}

impl SerialConfig {
    /// Read/write timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause after opening the port.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Pause after a live baud change.
    pub fn baud_settle(&self) -> Duration {
        Duration::from_millis(self.baud_settle_ms)
    }

    /// Echo wait after a plain command.
    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    /// Pause between `*RST` and closing the port.
    pub fn close_pause(&self) -> Duration {
        Duration::from_millis(self.close_pause_ms)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl DmmConfig {
    /// Load defaults overridden by `RUST_DMM_` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if a variable has the wrong type or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Self::env());
        Self::from_figment(figment)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Self::env())
    }

    fn env() -> Env {
        Env::prefixed("RUST_DMM_").split("__")
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(ConfigError::LoadError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Baud rate and timeout are non-zero
    /// - At least one fetch attempt is allowed
    /// - The model pattern is a valid regex
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid baud_rate 0. Must be > 0".to_string(),
            ));
        }

        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid timeout_ms 0. Must be > 0".to_string(),
            ));
        }

        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid fetch.max_attempts 0. Must be >= 1".to_string(),
            ));
        }

        if let Err(e) = RegexBuilder::new(&self.identity.model_pattern)
            .case_insensitive(true)
            .build()
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid model_pattern '{}': {}",
                self.identity.model_pattern, e
            )));
        }

        Ok(())
    }
}
