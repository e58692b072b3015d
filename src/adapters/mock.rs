//! Mock hardware adapter for testing
//!
//! A scripted stand-in for the multimeter. It provides:
//! - Optional command echo, like a meter with echo enabled
//! - Per-command replies, persistent or one-shot
//! - Unsolicited input lines (noise)
//! - Controllable failure injection
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep a handle while the driver owns
//! the adapter.

use super::{AdapterError, HardwareAdapter, LinkSettings};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest a read on an empty input queue blocks.
const IDLE_READ: Duration = Duration::from_millis(5);

#[derive(Default)]
struct MockState {
    connected: bool,
    settings: Option<LinkSettings>,
    echo: bool,
    replies: HashMap<String, Vec<String>>,
    one_shot: HashMap<String, VecDeque<Vec<String>>>,
    input: VecDeque<String>,
    written: Vec<String>,
    call_log: Vec<String>,
    fail_next_write: bool,
    fail_next_read: bool,
    fail_connect: bool,
    dtr_unsupported: bool,
    live_baud: bool,
}

/// Mock hardware adapter for testing
///
/// # Example
///
/// ```
/// use rust_dmm::adapters::{HardwareAdapter, LinkSettings, MockAdapter};
/// use std::time::Duration;
///
/// let mut adapter = MockAdapter::new();
/// adapter.reply("*IDN?", ["BK PRECISION,2831E,0,1.0"]);
/// adapter
///     .connect(&LinkSettings::new("mock", 9600, Duration::from_millis(50)))
///     .unwrap();
/// adapter.write_all(b"*IDN?\n").unwrap();
/// let line = adapter.read_line(Duration::from_millis(10)).unwrap();
/// assert_eq!(line.as_deref(), Some("BK PRECISION,2831E,0,1.0"));
/// ```
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

fn normalize(command: &str) -> String {
    command.trim().to_ascii_uppercase()
}

impl MockAdapter {
    /// Create a disconnected mock with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Echo every written command back as an input line.
    pub fn with_echo(self, echo: bool) -> Self {
        self.state().echo = echo;
        self
    }

    /// Answer `command` with `lines` every time it is written.
    pub fn reply<I, S>(&self, command: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines.into_iter().map(Into::into).collect();
        self.state().replies.insert(normalize(command), lines);
    }

    /// Answer the next write of `command` with `lines`.
    ///
    /// One-shot replies queue up and take precedence over [`Self::reply`].
    pub fn reply_once<I, S>(&self, command: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines.into_iter().map(Into::into).collect();
        self.state()
            .one_shot
            .entry(normalize(command))
            .or_default()
            .push_back(lines);
    }

    /// Queue an unsolicited input line.
    pub fn push_line(&self, line: impl Into<String>) {
        self.state().input.push_back(line.into());
    }

    /// Lines waiting to be read.
    pub fn pending_input(&self) -> usize {
        self.state().input.len()
    }

    /// Command lines written so far, without terminators.
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    /// Number of writes of `command` (case-insensitive).
    pub fn count_written(&self, command: &str) -> usize {
        let key = normalize(command);
        self.state()
            .written
            .iter()
            .filter(|line| normalize(line) == key)
            .count()
    }

    /// Get the call log
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Clear the call log and the written-command record.
    pub fn clear_log(&self) {
        let mut state = self.state();
        state.call_log.clear();
        state.written.clear();
    }

    /// Inject a failure for the next write
    pub fn inject_next_failure(&self) {
        self.state().fail_next_write = true;
    }

    /// Inject a failure for the next read
    pub fn inject_read_failure(&self) {
        self.state().fail_next_read = true;
    }

    /// Make every connect attempt fail.
    pub fn set_connect_fails(&self, fails: bool) {
        self.state().fail_connect = fails;
    }

    /// Report DTR control as unsupported.
    pub fn set_dtr_supported(&self, supported: bool) {
        self.state().dtr_unsupported = !supported;
    }

    /// Allow baud rate changes on the open link.
    pub fn set_live_baud(&self, supported: bool) {
        self.state().live_baud = supported;
    }

    /// Set the connection state manually
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Settings of the last successful connect.
    pub fn last_settings(&self) -> Option<LinkSettings> {
        self.state().settings.clone()
    }
}

impl HardwareAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&mut self, settings: &LinkSettings) -> Result<(), AdapterError> {
        let mut state = self.state();
        state.call_log.push(format!(
            "connect {} @ {}",
            settings.port, settings.baud_rate
        ));
        if state.fail_connect {
            return Err(AdapterError::ConnectionFailed(format!(
                "Injected failure opening '{}'",
                settings.port
            )));
        }
        state.connected = true;
        state.settings = Some(settings.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state();
        if state.connected {
            state.call_log.push("disconnect".to_string());
            state.connected = false;
        }
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), AdapterError> {
        let mut state = self.state();
        if !state.connected {
            return Err(AdapterError::NotConnected);
        }
        if std::mem::take(&mut state.fail_next_write) {
            return Err(AdapterError::SendFailed("Injected failure".to_string()));
        }

        let text = String::from_utf8_lossy(data);
        for command in text.split('\n').map(str::trim_end).filter(|c| !c.is_empty()) {
            state.written.push(command.to_string());
            if state.echo {
                state.input.push_back(command.to_string());
            }

            let key = normalize(command);
            let one_shot = state.one_shot.get_mut(&key).and_then(VecDeque::pop_front);
            let scripted = match one_shot {
                Some(lines) => Some(lines),
                None => state.replies.get(&key).cloned(),
            };
            if let Some(lines) = scripted {
                state.input.extend(lines);
            }
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, AdapterError> {
        {
            let mut state = self.state();
            if !state.connected {
                return Err(AdapterError::NotConnected);
            }
            if std::mem::take(&mut state.fail_next_read) {
                return Err(AdapterError::ReadFailed("Injected failure".to_string()));
            }
            if let Some(line) = state.input.pop_front() {
                return Ok(Some(line));
            }
        }
        std::thread::sleep(timeout.min(IDLE_READ));
        Ok(None)
    }

    fn clear_buffers(&mut self) -> Result<(), AdapterError> {
        let mut state = self.state();
        if !state.connected {
            return Err(AdapterError::NotConnected);
        }
        state.input.clear();
        state.call_log.push("clear".to_string());
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), AdapterError> {
        let mut state = self.state();
        if state.dtr_unsupported {
            return Err(AdapterError::Unsupported("set_dtr"));
        }
        state.call_log.push(format!("dtr {}", level));
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), AdapterError> {
        let mut state = self.state();
        if !state.live_baud {
            return Err(AdapterError::Unsupported("set_baud_rate"));
        }
        state.call_log.push(format!("baud {}", baud_rate));
        if let Some(settings) = state.settings.as_mut() {
            settings.baud_rate = baud_rate;
        }
        Ok(())
    }
}
