//! Robust fetch behavior seen through the driver: noise filtering, retries,
//! cooloff and throttling.

mod common;

use common::{connected, meter, quick_config};
use rust_dmm::instrument::fetch::cooloff_duration;
use rust_dmm::instrument::FetchPolicy;
use rust_dmm::{Bk2831e, DmmError, MeasurementFunction};
use std::time::{Duration, Instant};

#[test]
fn test_single_float_among_noise() {
    let (mut dmm, mock) = connected();
    mock.reply("FETCH?", ["FETCH?", "FETC", "", "  ", "+1.234E+00"]);

    let volts = dmm.read_dc_voltage("V", None).unwrap();

    assert_eq!(volts, 1.234);
    assert_eq!(mock.count_written("FETCH?"), 1);
    assert_eq!(dmm.fetch_state().error_streak(), 0);
}

#[test]
fn test_number_embedded_in_text() {
    let (mut dmm, mock) = connected();
    mock.reply("FETCH?", ["VDC  -0.0042 V"]);

    assert_eq!(dmm.read_dc_voltage("mV", None).unwrap(), -4.2);
}

#[test]
fn test_echoing_meter_reading() {
    let mock = meter().with_echo(true);
    mock.reply("FETCH?", ["5.000E-01"]);
    let mut dmm = Bk2831e::new(mock, quick_config()).unwrap();
    dmm.connect(None).unwrap();

    assert_eq!(dmm.read_ac_voltage("V", None).unwrap(), 0.5);
}

#[test]
fn test_exhaustion_enters_cooloff() {
    let (mut dmm, mock) = connected();
    mock.reply("FETCH?", ["FETCH?", "ERR"]);

    let err = dmm.read_dc_voltage("V", None).unwrap_err();

    assert!(matches!(err, DmmError::FetchExhausted { attempts: 3, .. }));
    assert!(err.is_fetch_exhausted());
    assert!(dmm.is_cooling());
    assert_eq!(dmm.fetch_state().error_streak(), 3);
    assert_eq!(mock.count_written("FETCH?"), 3);
    assert!(dmm.recommended_poll_interval() >= Duration::from_millis(1500));

    let log = mock.call_log();
    let clears = log.iter().filter(|c| c.as_str() == "clear").count();
    assert_eq!(clears, 4, "one light reset per attempt plus the heavy reset");
    assert!(log.contains(&"dtr false".to_string()));
    assert!(log.contains(&"dtr true".to_string()));
}

#[test]
fn test_success_after_cooloff_resets_streak_only() {
    let (mut dmm, mock) = connected();
    mock.reply_once("FETCH?", ["FETC"]);
    mock.reply_once("FETCH?", ["FETC"]);
    mock.reply_once("FETCH?", ["FETC"]);
    assert!(dmm.read_dc_voltage("V", None).is_err());
    let deadline = dmm.fetch_state().cooloff_until().unwrap();

    mock.reply("FETCH?", ["3.3"]);
    assert_eq!(dmm.read_dc_voltage("V", None).unwrap(), 3.3);

    assert_eq!(dmm.fetch_state().error_streak(), 0);
    assert_eq!(dmm.fetch_state().cooloff_until(), Some(deadline));
    assert!(dmm.is_cooling());
}

#[test]
fn test_cooloff_lengths() {
    let policy = FetchPolicy::default();
    assert_eq!(cooloff_duration(1, &policy), Duration::from_millis(1000));
    assert_eq!(cooloff_duration(3, &policy), Duration::from_millis(1400));
    assert_eq!(cooloff_duration(5, &policy), Duration::from_millis(1400));
}

#[test]
fn test_single_attempt_cooloff_is_one_second() {
    let mut config = quick_config();
    config.fetch.max_attempts = 1;
    let mock = meter();
    let mut dmm = Bk2831e::new(mock.clone(), config).unwrap();
    dmm.connect(None).unwrap();

    let before = Instant::now();
    assert!(dmm.read_frequency("Hz", None).is_err());
    let until = dmm.fetch_state().cooloff_until().unwrap();

    let length = until.duration_since(before);
    assert!(length >= Duration::from_millis(1000));
    assert!(length < Duration::from_millis(1300));
}

#[test]
fn test_read_error_ends_window_and_retries() {
    let (mut dmm, mock) = connected();
    dmm.select_function(MeasurementFunction::DcCurrent).unwrap();
    mock.reply("FETCH?", ["0.125"]);
    mock.inject_read_failure();

    let amps = dmm.read_dc_current("mA", None).unwrap();

    assert_eq!(amps, 125.0);
    assert_eq!(mock.count_written("FETCH?"), 2);
    assert_eq!(dmm.fetch_state().error_streak(), 0);
}

#[test]
fn test_write_failure_is_not_retried() {
    let (mut dmm, mock) = connected();
    dmm.select_function(MeasurementFunction::DcVoltage).unwrap();
    mock.inject_next_failure();

    let err = dmm.read_dc_voltage("V", None).unwrap_err();

    assert!(matches!(err, DmmError::WriteError { ref command, .. } if command == "FETCH?"));
    assert_eq!(mock.count_written("FETCH?"), 0);
    assert!(!dmm.is_cooling());
}

#[test]
fn test_commands_are_throttled() {
    let mut config = quick_config();
    config.fetch.min_command_interval_ms = 40;
    let mock = meter();
    mock.reply("FETCH?", ["1.0"]);
    let mut dmm = Bk2831e::new(mock, config).unwrap();
    dmm.connect(None).unwrap();
    dmm.select_function(MeasurementFunction::DcVoltage).unwrap();

    dmm.read_dc_voltage("V", None).unwrap();
    let start = Instant::now();
    dmm.read_dc_voltage("V", None).unwrap();

    assert!(start.elapsed() >= Duration::from_millis(35));
}
