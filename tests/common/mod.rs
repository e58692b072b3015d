//! Shared fixtures for driver integration tests.

#![allow(dead_code)]

use rust_dmm::adapters::MockAdapter;
use rust_dmm::instrument::FetchPolicy;
use rust_dmm::{Bk2831e, DmmConfig};

pub const IDN: &str = "BK PRECISION,2831E Multimeter,SN123,V1.0";

/// Configuration with every delay shrunk so tests run fast.
pub fn quick_config() -> DmmConfig {
    let mut config = DmmConfig::default();
    config.serial.port = Some("/dev/ttyMOCK0".to_string());
    config.serial.timeout_ms = 20;
    config.serial.settle_ms = 0;
    config.serial.baud_settle_ms = 0;
    config.serial.echo_timeout_ms = 2;
    config.serial.close_pause_ms = 0;
    config.fetch = FetchPolicy {
        min_command_interval_ms: 0,
        min_response_window_ms: 20,
        read_poll_ms: 5,
        backoff_step_ms: 1,
        dtr_pulse_ms: 1,
        ..FetchPolicy::default()
    };
    config
}

/// A mock meter that identifies as a 2831E.
pub fn meter() -> MockAdapter {
    let mock = MockAdapter::new();
    mock.reply("*IDN?", [IDN]);
    mock
}

/// A connected driver and a handle on its mock.
pub fn connected() -> (Bk2831e<MockAdapter>, MockAdapter) {
    let mock = meter();
    let mut dmm = Bk2831e::new(mock.clone(), quick_config()).unwrap();
    dmm.connect(None).unwrap();
    mock.clear_log();
    (dmm, mock)
}
