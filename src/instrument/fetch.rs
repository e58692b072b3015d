//! Robust numeric fetch with retry, backoff and cooloff.
//!
//! Each attempt sends the query, then reads lines for a response window,
//! skipping echoes and partial echoes (`FETCH?`, `FETC`) and taking the first
//! line that yields a number. A failed attempt clears the port buffers and
//! backs off linearly. When every attempt fails the engine enters a cooloff
//! period, pulses DTR and reports [`DmmError::FetchExhausted`].
//!
//! The error streak carries over between calls and resets on any success, so
//! repeated failures lengthen the cooloff up to a cap.

use super::scpi::ScpiLink;
use crate::adapters::HardwareAdapter;
use crate::error::{DmmError, DmmResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[allow(clippy::expect_used)]
static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?")
        .expect("numeric token pattern is valid")
});

/// Retry and timing parameters of the fetch engine. All intervals in ms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Minimum spacing between consecutive commands
    pub min_command_interval_ms: u64,
    /// Shortest response window; the serial timeout applies when longer
    pub min_response_window_ms: u64,
    /// Timeout of each line read inside the window
    pub read_poll_ms: u64,
    /// Backoff after failed attempt `n` is `n * backoff_step_ms`
    pub backoff_step_ms: u64,
    /// Cooloff before streak scaling
    pub cooloff_base_ms: u64,
    /// Cooloff added per failure in the streak
    pub cooloff_step_ms: u64,
    /// Streak length beyond which the cooloff stops growing
    pub streak_cap: u32,
    /// Duration DTR is held low during a heavy reset
    pub dtr_pulse_ms: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_command_interval_ms: 40,
            min_response_window_ms: 150,
            read_poll_ms: 100,
            backoff_step_ms: 150,
            cooloff_base_ms: 800,
            cooloff_step_ms: 200,
            streak_cap: 3,
            dtr_pulse_ms: 50,
        }
    }
}

impl FetchPolicy {
    /// Minimum spacing between commands.
    pub fn min_command_interval(&self) -> Duration {
        Duration::from_millis(self.min_command_interval_ms)
    }

    /// Response window for a given serial timeout.
    pub fn response_window(&self, serial_timeout: Duration) -> Duration {
        Duration::from_millis(self.min_response_window_ms).max(serial_timeout)
    }

    /// Per-read timeout inside the window.
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    /// Backoff after the given 1-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(attempt)))
    }

    /// DTR low time during a heavy reset.
    pub fn dtr_pulse(&self) -> Duration {
        Duration::from_millis(self.dtr_pulse_ms)
    }
}

/// Cooloff length after exhausting retries with the given error streak.
pub fn cooloff_duration(streak: u32, policy: &FetchPolicy) -> Duration {
    let steps = u64::from(streak.min(policy.streak_cap));
    Duration::from_millis(
        policy
            .cooloff_base_ms
            .saturating_add(policy.cooloff_step_ms.saturating_mul(steps)),
    )
}

/// Extract a reading from one response line.
///
/// Returns `None` for blank lines, echoes of `command`, partial echoes (any
/// prefix of the command without its `?`) and lines without a number.
pub fn parse_reading(line: &str, command: &str) -> Option<f64> {
    let text = line.trim();
    if text.is_empty() {
        return None;
    }

    let upper = text.to_ascii_uppercase();
    let command = command.trim().to_ascii_uppercase();
    let base = command.trim_end_matches('?');
    if upper == command || base.starts_with(&upper) {
        return None;
    }

    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }
    NUMBER.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Failure bookkeeping that survives between fetches.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    error_streak: u32,
    cooloff_until: Option<Instant>,
}

impl FetchState {
    /// Consecutive failed attempts.
    pub fn error_streak(&self) -> u32 {
        self.error_streak
    }

    /// End of the current cooloff, if one was ever entered.
    pub fn cooloff_until(&self) -> Option<Instant> {
        self.cooloff_until
    }

    /// Whether `now` is inside the cooloff period.
    pub fn is_cooling_at(&self, now: Instant) -> bool {
        self.cooloff_until.is_some_and(|until| now < until)
    }

    /// A value was parsed.
    pub fn record_success(&mut self) {
        self.error_streak = 0;
    }

    /// An attempt's window closed without a value.
    pub fn record_failure(&mut self) {
        self.error_streak = self.error_streak.saturating_add(1);
    }

    /// Extend the cooloff deadline. It never moves backwards.
    pub fn enter_cooloff(&mut self, now: Instant, policy: &FetchPolicy) -> Instant {
        let candidate = now + cooloff_duration(self.error_streak, policy);
        let until = match self.cooloff_until {
            Some(current) if current > candidate => current,
            _ => candidate,
        };
        self.cooloff_until = Some(until);
        until
    }
}

/// Retry engine producing a trustworthy `f64` from a noisy link.
#[derive(Debug, Clone, Default)]
pub struct FetchEngine {
    policy: FetchPolicy,
    state: FetchState,
}

impl FetchEngine {
    /// Engine with the given policy and a clean state.
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            policy,
            state: FetchState::default(),
        }
    }

    /// Active policy.
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Failure bookkeeping.
    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Whether the engine is in cooloff.
    pub fn is_cooling(&self) -> bool {
        self.state.is_cooling_at(Instant::now())
    }

    fn throttle<A: HardwareAdapter>(&self, link: &ScpiLink<A>) {
        if let Some(last) = link.last_command_at() {
            let elapsed = last.elapsed();
            let interval = self.policy.min_command_interval();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
    }

    /// Read lines until a value parses or the window closes.
    fn read_window<A: HardwareAdapter>(
        &self,
        link: &mut ScpiLink<A>,
        command: &str,
        window: Duration,
    ) -> Option<f64> {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match link.read_line(self.policy.read_poll().min(remaining)) {
                Ok(Some(line)) => {
                    if let Some(value) = parse_reading(&line, command) {
                        return Some(value);
                    }
                    if !line.is_empty() {
                        trace!(line = %line, "ignored non-numeric line");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "read failed; closing window early");
                    return None;
                }
            }
        }
    }

    /// Send `command` and return the first numeric reply.
    ///
    /// A failed write is returned immediately; everything else is retried.
    pub fn fetch<A: HardwareAdapter>(
        &mut self,
        link: &mut ScpiLink<A>,
        command: &str,
        serial_timeout: Duration,
    ) -> DmmResult<f64> {
        let attempts = self.policy.max_attempts.max(1);
        let window = self.policy.response_window(serial_timeout);

        for attempt in 1..=attempts {
            self.throttle(link);
            link.send(command)?;

            if let Some(value) = self.read_window(link, command, window) {
                self.state.record_success();
                trace!(command, value, attempt, "fetched");
                return Ok(value);
            }

            self.state.record_failure();
            warn!(
                command,
                attempt,
                streak = self.state.error_streak(),
                "no numeric reply"
            );
            link.light_reset();
            std::thread::sleep(self.policy.backoff(attempt));
        }

        let until = self.state.enter_cooloff(Instant::now(), &self.policy);
        warn!(
            command,
            cooloff_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
            "fetch exhausted; cooling off"
        );
        link.heavy_reset(self.policy.dtr_pulse());
        Err(DmmError::FetchExhausted {
            command: command.trim().to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LinkSettings, MockAdapter};

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            max_attempts: 3,
            min_command_interval_ms: 1,
            min_response_window_ms: 20,
            read_poll_ms: 5,
            backoff_step_ms: 1,
            cooloff_base_ms: 800,
            cooloff_step_ms: 200,
            streak_cap: 3,
            dtr_pulse_ms: 1,
        }
    }

    fn open_link(mock: &MockAdapter) -> ScpiLink<MockAdapter> {
        let mut link = ScpiLink::new(mock.clone());
        link.open(&LinkSettings::new("mock", 9600, Duration::from_millis(10)))
            .unwrap();
        link
    }

    #[test]
    fn test_cooloff_duration_caps_streak() {
        let policy = FetchPolicy::default();
        assert_eq!(cooloff_duration(1, &policy), Duration::from_millis(1000));
        assert_eq!(cooloff_duration(3, &policy), Duration::from_millis(1400));
        assert_eq!(cooloff_duration(5, &policy), Duration::from_millis(1400));
        assert_eq!(cooloff_duration(0, &policy), Duration::from_millis(800));
    }

    #[test]
    fn test_parse_reading_filters_echoes() {
        assert_eq!(parse_reading("FETCH?", "FETCH?"), None);
        assert_eq!(parse_reading("fetc", "FETCH?"), None);
        assert_eq!(parse_reading("FETCH", "FETCH?"), None);
        assert_eq!(parse_reading("   ", "FETCH?"), None);
        assert_eq!(parse_reading("ERR", "FETCH?"), None);
    }

    #[test]
    fn test_parse_reading_numbers() {
        assert_eq!(parse_reading("1.234", "FETCH?"), Some(1.234));
        assert_eq!(parse_reading(" -4.5E-03 ", "FETCH?"), Some(-4.5e-3));
        assert_eq!(parse_reading("VDC +12.5 V", "FETCH?"), Some(12.5));
        assert_eq!(parse_reading(".5", "FETCH?"), Some(0.5));
    }

    #[test]
    fn test_cooloff_never_moves_backwards() {
        let policy = FetchPolicy::default();
        let mut state = FetchState::default();
        let now = Instant::now();

        for _ in 0..3 {
            state.record_failure();
        }
        let first = state.enter_cooloff(now + Duration::from_secs(10), &policy);

        state.record_success();
        let second = state.enter_cooloff(now, &policy);
        assert_eq!(first, second);
        assert!(state.is_cooling_at(now));
    }

    #[test]
    fn test_fetch_returns_first_number_among_noise() {
        let mock = MockAdapter::new();
        mock.reply("FETCH?", ["FETCH?", "FETC", "garbage", "+1.234E+00"]);
        let mut link = open_link(&mock);
        let mut engine = FetchEngine::new(fast_policy());

        let value = engine
            .fetch(&mut link, "FETCH?", Duration::from_millis(10))
            .unwrap();
        assert_eq!(value, 1.234);
        assert_eq!(engine.state().error_streak(), 0);
        assert_eq!(mock.count_written("FETCH?"), 1);
    }

    #[test]
    fn test_fetch_retries_then_succeeds() {
        let mock = MockAdapter::new();
        mock.reply_once("FETCH?", ["FETC"]);
        mock.reply("FETCH?", ["2.5"]);
        let mut link = open_link(&mock);
        let mut engine = FetchEngine::new(fast_policy());

        let value = engine
            .fetch(&mut link, "FETCH?", Duration::from_millis(10))
            .unwrap();
        assert_eq!(value, 2.5);
        assert_eq!(mock.count_written("FETCH?"), 2);
        assert_eq!(engine.state().error_streak(), 0);
        assert!(!engine.is_cooling());
    }

    #[test]
    fn test_fetch_exhausted_enters_cooloff() {
        let mock = MockAdapter::new();
        mock.reply("FETCH?", ["FETCH?"]);
        let mut link = open_link(&mock);
        let mut engine = FetchEngine::new(fast_policy());

        let err = engine
            .fetch(&mut link, "FETCH?", Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, DmmError::FetchExhausted { attempts: 3, .. }));
        assert!(engine.is_cooling());
        assert_eq!(engine.state().error_streak(), 3);
        assert_eq!(mock.count_written("FETCH?"), 3);
        assert!(mock.call_log().contains(&"dtr false".to_string()));
    }

    #[test]
    fn test_fetch_send_failure_propagates() {
        let mock = MockAdapter::new();
        let mut link = open_link(&mock);
        mock.inject_next_failure();
        let mut engine = FetchEngine::new(fast_policy());

        let err = engine
            .fetch(&mut link, "FETCH?", Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, DmmError::WriteError { .. }));
        assert_eq!(engine.state().error_streak(), 0);
        assert!(!engine.is_cooling());
    }
}
