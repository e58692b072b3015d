//! Custom error types for the driver.
//!
//! This module defines the primary error type, `DmmError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failure a noisy serial multimeter can produce.
//!
//! ## Error Hierarchy
//!
//! `DmmError` consolidates the failure modes seen by callers:
//!
//! - **`LinkUnavailable`**: No connection is held, or the port could not be opened.
//!   Every command issued without a live link fails fast with this error.
//! - **`WriteError`**: The transport refused a write. Wraps the underlying
//!   [`AdapterError`].
//! - **`IdentityMismatch`**: `*IDN?` was silent or did not name the expected model.
//! - **`NoPortAvailable`**: Neither an explicit port nor a remembered one exists.
//!   Port discovery itself belongs to the caller.
//! - **`UnsupportedFunction`**: A measurement function name outside the fixed set.
//! - **`FetchExhausted`**: Every attempt of a robust fetch failed. The driver is in
//!   cooloff afterwards; see `Bk2831e::is_cooling`.
//! - **`Unavailable`**: Returned by best-effort queries (reference read-back,
//!   reference acquisition) that degrade instead of propagating the real cause.
//! - **`Config`**: Configuration could not be loaded or failed validation.
//!
//! Transport-level problems are described by [`AdapterError`], which callers mostly
//! see wrapped inside `WriteError` or `LinkUnavailable`.

use crate::adapters::AdapterError;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type DmmResult<T> = std::result::Result<T, DmmError>;

/// Errors reported by the multimeter driver.
#[derive(Error, Debug)]
pub enum DmmError {
    /// No open link to the instrument.
    #[error("Serial link unavailable: {0}")]
    LinkUnavailable(String),

    /// The transport failed to write a command.
    #[error("Failed to write '{command}': {source}")]
    WriteError {
        /// Command line that was being sent.
        command: String,
        /// Underlying transport failure.
        #[source]
        source: AdapterError,
    },

    /// The instrument did not identify as the expected model.
    #[error("Identity mismatch: expected '{expected}', got {actual:?}")]
    IdentityMismatch {
        /// Model pattern that was required.
        expected: String,
        /// Response received, if any.
        actual: Option<String>,
    },

    /// No serial port was given and none is remembered.
    #[error("No serial port available")]
    NoPortAvailable,

    /// Measurement function outside the supported set.
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    /// All fetch attempts failed; the driver is cooling off.
    #[error("Unable to fetch a numeric value for '{command}' after {attempts} attempts")]
    FetchExhausted {
        /// Query that was retried.
        command: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A best-effort query could not produce a value.
    #[error("Value unavailable: {0}")]
    Unavailable(String),

    /// Configuration load or validation failure.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl DmmError {
    /// True for errors that leave the driver in cooloff.
    pub fn is_fetch_exhausted(&self) -> bool {
        matches!(self, DmmError::FetchExhausted { .. })
    }
}
