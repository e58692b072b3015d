//! Hardware adapter implementations
//!
//! This module defines the [`HardwareAdapter`] trait, the byte/line transport the
//! multimeter driver is built on, together with its implementations:
//!
//! - [`SerialAdapter`]: RS-232 / USB-serial links through the `serialport` crate
//!   (requires the `instrument_serial` feature).
//! - [`MockAdapter`]: a scripted instrument for tests and offline development.
//!
//! Adapters are synchronous. Every call blocks the calling thread for at most
//! the timeout it is given.

pub mod mock;
pub mod serial_adapter;

pub use mock::MockAdapter;
pub use serial_adapter::SerialAdapter;

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a hardware adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Operation needs an open port.
    #[error("Adapter not connected")]
    NotConnected,

    /// The port could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A write did not complete.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A read failed for a reason other than a timeout.
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The adapter has no implementation of an optional operation.
    #[error("Operation '{0}' not supported by this adapter")]
    Unsupported(&'static str),
}

/// Parameters used to open a link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate (e.g., 9600)
    pub baud_rate: u32,
    /// Read/write timeout
    pub timeout: Duration,
}

impl LinkSettings {
    /// Create link settings for a port.
    pub fn new(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout,
        }
    }
}

/// Line-oriented duplex transport to an instrument.
///
/// The required methods cover opening, closing, writing and reading one line.
/// The remaining methods are optional capabilities; their default
/// implementations return [`AdapterError::Unsupported`] and callers are expected
/// to tolerate that.
pub trait HardwareAdapter: Send {
    /// Short adapter name used in logs.
    fn name(&self) -> &str;

    /// Open the link.
    fn connect(&mut self, settings: &LinkSettings) -> Result<(), AdapterError>;

    /// Close the link. Closing a closed adapter is a no-op.
    fn disconnect(&mut self);

    /// Whether the link is open.
    fn is_connected(&self) -> bool;

    /// Write all bytes and flush.
    fn write_all(&mut self, data: &[u8]) -> Result<(), AdapterError>;

    /// Read one line, without its terminator.
    ///
    /// Returns `Ok(None)` if no complete line arrived within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, AdapterError>;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("clear_buffers"))
    }

    /// Drive the DTR handshake line.
    fn set_dtr(&mut self, _level: bool) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("set_dtr"))
    }

    /// Change the baud rate of the open link in place.
    fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("set_baud_rate"))
    }
}

impl<A: HardwareAdapter + ?Sized> HardwareAdapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn connect(&mut self, settings: &LinkSettings) -> Result<(), AdapterError> {
        (**self).connect(settings)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), AdapterError> {
        (**self).write_all(data)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, AdapterError> {
        (**self).read_line(timeout)
    }

    fn clear_buffers(&mut self) -> Result<(), AdapterError> {
        (**self).clear_buffers()
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), AdapterError> {
        (**self).set_dtr(level)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), AdapterError> {
        (**self).set_baud_rate(baud_rate)
    }
}
