//! Line protocol on top of a [`HardwareAdapter`].
//!
//! Commands are single ASCII lines terminated by `\n`. The meter may echo a
//! command back before answering, depending on its `SYS:RETURN` setting, so
//! every primitive here tolerates one echo line.

use crate::adapters::{HardwareAdapter, LinkSettings};
use crate::error::{DmmError, DmmResult};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// An open link to the meter.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Port the link was opened on
    pub port: String,
    /// Host-side baud rate
    pub baud_rate: u32,
    /// Read/write timeout
    pub timeout: Duration,
    /// Model string matched in the `*IDN?` reply
    pub identity: Option<String>,
}

/// Command/query primitives bound to one adapter.
pub struct ScpiLink<A: HardwareAdapter> {
    adapter: A,
    connection: Option<Connection>,
    last_command_at: Option<Instant>,
}

fn is_echo(line: &str, command: &str) -> bool {
    let command = command.trim();
    line.eq_ignore_ascii_case(command)
        || line.eq_ignore_ascii_case(command.trim_end_matches('?'))
}

impl<A: HardwareAdapter> ScpiLink<A> {
    /// Wrap a closed adapter.
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            connection: None,
            last_command_at: None,
        }
    }

    /// Open the adapter and record the connection.
    pub fn open(&mut self, settings: &LinkSettings) -> DmmResult<()> {
        self.adapter.connect(settings).map_err(|e| {
            DmmError::LinkUnavailable(format!("failed to open '{}': {}", settings.port, e))
        })?;
        self.connection = Some(Connection {
            port: settings.port.clone(),
            baud_rate: settings.baud_rate,
            timeout: settings.timeout,
            identity: None,
        });
        Ok(())
    }

    /// Drop the connection and close the adapter.
    pub fn close(&mut self) {
        self.adapter.disconnect();
        self.connection = None;
    }

    /// Whether a connection is held.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// The held connection.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// Time the last command went out.
    pub fn last_command_at(&self) -> Option<Instant> {
        self.last_command_at
    }

    /// Underlying adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub(crate) fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    fn require_connection(&self) -> DmmResult<()> {
        if self.connection.is_none() {
            return Err(DmmError::LinkUnavailable("not connected".to_string()));
        }
        Ok(())
    }

    /// Write one command line.
    pub fn send(&mut self, command: &str) -> DmmResult<()> {
        self.require_connection()?;
        let line = format!("{}\n", command.trim());
        self.adapter
            .write_all(line.as_bytes())
            .map_err(|source| DmmError::WriteError {
                command: command.trim().to_string(),
                source,
            })?;
        self.last_command_at = Some(Instant::now());
        trace!(command = command.trim(), "sent");
        Ok(())
    }

    /// Read one trimmed line. `None` on silence.
    pub fn read_line(&mut self, timeout: Duration) -> DmmResult<Option<String>> {
        self.require_connection()?;
        let line = self
            .adapter
            .read_line(timeout)
            .map_err(|e| DmmError::LinkUnavailable(format!("read failed: {}", e)))?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    /// Send a command and swallow one possible echo line.
    pub fn send_absorbing_echo(&mut self, command: &str, timeout: Duration) -> DmmResult<()> {
        self.send(command)?;
        match self.adapter.read_line(timeout) {
            Ok(Some(line)) => trace!(discarded = %line.trim(), "echo slot"),
            Ok(None) => {}
            Err(e) => trace!(error = %e, "echo read failed"),
        }
        Ok(())
    }

    /// Send a query and return the first line that is not its echo.
    ///
    /// Silence yields an empty string.
    pub fn query(&mut self, command: &str, timeout: Duration) -> DmmResult<String> {
        self.send(command)?;
        let first = self.read_line(timeout)?.unwrap_or_default();
        if !is_echo(&first, command) {
            return Ok(first);
        }

        let second = self.read_line(timeout)?.unwrap_or_default();
        if is_echo(&second, command) {
            debug!(command = command.trim(), "only echoes received");
            return Ok(String::new());
        }
        Ok(second)
    }

    /// Discard buffered input and output. Failures are ignored.
    pub fn light_reset(&mut self) {
        if let Err(e) = self.adapter.clear_buffers() {
            trace!(error = %e, "buffer clear skipped");
        }
    }

    /// Pulse DTR low for `pulse`, then do a light reset.
    pub fn heavy_reset(&mut self, pulse: Duration) {
        match self.adapter.set_dtr(false) {
            Ok(()) => {
                std::thread::sleep(pulse);
                if let Err(e) = self.adapter.set_dtr(true) {
                    debug!(error = %e, "DTR restore failed");
                }
            }
            Err(e) => trace!(error = %e, "DTR toggle skipped"),
        }
        self.light_reset();
    }
}
