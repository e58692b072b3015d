//! Serial port adapter for RS-232 instruments.
//!
//! Wraps the `serialport` crate behind the [`HardwareAdapter`] trait. Reads are
//! buffered so that bytes arriving after a line terminator are kept for the
//! next `read_line` call instead of being dropped.

use super::{AdapterError, HardwareAdapter, LinkSettings};
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::time::Instant;
#[cfg(feature = "instrument_serial")]
use tracing::{debug, trace};

/// Upper bound for a single blocking read on the port.
#[cfg(feature = "instrument_serial")]
const READ_SLICE: Duration = Duration::from_millis(20);

/// Serial adapter for RS-232 communication
///
/// Responses are split on `\n`; a trailing `\r` is stripped.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Write timeout
    timeout: Duration,

    /// Bytes received but not yet returned as a line
    pending: Vec<u8>,

    /// The open serial port
    #[cfg(feature = "instrument_serial")]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialAdapter {
    /// Create a closed serial adapter.
    pub fn new() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            timeout: Duration::from_millis(1500),
            pending: Vec::new(),
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Port name of the last connect attempt.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Baud rate of the last connect attempt or live change.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Split the first complete line off the pending buffer.
    #[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Default for SerialAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "instrument_serial")]
impl HardwareAdapter for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    fn connect(&mut self, settings: &LinkSettings) -> Result<(), AdapterError> {
        self.port_name = settings.port.clone();
        self.baud_rate = settings.baud_rate;
        self.timeout = settings.timeout;

        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| {
                AdapterError::ConnectionFailed(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    self.port_name, self.baud_rate, e
                ))
            })?;

        self.port = Some(port);
        self.pending.clear();
        debug!(
            "Serial port '{}' opened at {} baud",
            self.port_name, self.baud_rate
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            self.pending.clear();
            debug!("Serial port '{}' closed", self.port_name);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), AdapterError> {
        use std::io::Write;

        let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;
        port.set_timeout(self.timeout)
            .map_err(|e| AdapterError::SendFailed(e.to_string()))?;
        port.write_all(data)
            .map_err(|e| AdapterError::SendFailed(e.to_string()))?;
        port.flush()
            .map_err(|e| AdapterError::SendFailed(e.to_string()))?;
        trace!("Wrote {} bytes to '{}'", data.len(), self.port_name);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, AdapterError> {
        use std::io::Read;

        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 64];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;
            port.set_timeout(remaining.min(READ_SLICE))
                .map_err(|e| AdapterError::ReadFailed(e.to_string()))?;

            match port.read(&mut buffer) {
                Ok(0) => {
                    return Err(AdapterError::ReadFailed("Unexpected EOF".to_string()));
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buffer[..n]);
                    if let Some(line) = self.take_line() {
                        trace!("Received line: {:?}", line);
                        return Ok(Some(line));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(AdapterError::Io(e)),
            }
        }
    }

    fn clear_buffers(&mut self) -> Result<(), AdapterError> {
        let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| AdapterError::Io(e.into()))?;
        self.pending.clear();
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), AdapterError> {
        let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;
        port.write_data_terminal_ready(level)
            .map_err(|e| AdapterError::Io(e.into()))
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), AdapterError> {
        let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;
        port.set_baud_rate(baud_rate)
            .map_err(|e| AdapterError::Io(e.into()))?;
        self.baud_rate = baud_rate;
        debug!("Serial port '{}' switched to {} baud", self.port_name, baud_rate);
        Ok(())
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl HardwareAdapter for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    fn connect(&mut self, settings: &LinkSettings) -> Result<(), AdapterError> {
        self.port_name = settings.port.clone();
        Err(AdapterError::ConnectionFailed(
            "Serial feature disabled".to_string(),
        ))
    }

    fn disconnect(&mut self) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn write_all(&mut self, _data: &[u8]) -> Result<(), AdapterError> {
        Err(AdapterError::NotConnected)
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, AdapterError> {
        Err(AdapterError::NotConnected)
    }
}
