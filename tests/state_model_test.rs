//! Function, range and NPLC caching: commands are only written when the
//! meter's state actually has to change.

mod common;

use common::connected;
use rust_dmm::{DmmError, IntegrationTime, MeasurementFunction, Multimeter, RangeSelector};

#[test]
fn test_repeated_set_function_sends_once() {
    let (mut dmm, mock) = connected();

    dmm.set_function("volt:dc").unwrap();
    dmm.set_function("VOLT:DC").unwrap();
    dmm.select_function(MeasurementFunction::DcVoltage).unwrap();

    assert_eq!(mock.written(), vec!["FUNC volt:dc".to_string()]);
    assert_eq!(dmm.active_function(), Some(MeasurementFunction::DcVoltage));
}

#[test]
fn test_unsupported_function_rejected() {
    let (mut dmm, mock) = connected();

    let err = dmm.set_function("volt:xx").unwrap_err();

    assert!(matches!(err, DmmError::UnsupportedFunction(_)));
    assert!(mock.written().is_empty());
    assert_eq!(dmm.active_function(), None);
}

#[test]
fn test_range_auto_then_fixed_then_same() {
    let (mut dmm, mock) = connected();
    dmm.set_function("volt:dc").unwrap();
    mock.clear_log();

    assert!(dmm.set_range("volt:dc", "AUTO"));
    assert!(dmm.set_range("volt:dc", "20"));
    assert!(dmm.set_range("volt:dc", "20"));

    assert_eq!(
        mock.written(),
        vec!["VOLT:DC:RANG:AUTO 1".to_string(), "VOLT:DC:RANG 20".to_string()]
    );
    assert_eq!(
        dmm.state().range(MeasurementFunction::DcVoltage),
        Some(&RangeSelector::Value("20".to_string()))
    );
}

#[test]
fn test_auto_is_case_insensitive_for_every_ranged_function() {
    let (mut dmm, mock) = connected();

    dmm.set_function("res").unwrap();
    assert!(dmm.set_range("res", "auto"));
    dmm.set_function("freq").unwrap();
    assert!(dmm.set_range("freq", "Auto"));

    assert_eq!(mock.count_written("RES:RANG:AUTO 1"), 1);
    assert_eq!(mock.count_written("FREQ:RANG:AUTO 1"), 1);
}

#[test]
fn test_range_on_inactive_function_is_skipped() {
    let (mut dmm, mock) = connected();
    dmm.set_function("curr:dc").unwrap();
    mock.clear_log();

    assert!(!dmm.set_range("volt:dc", "20"));

    assert!(mock.written().is_empty());
    assert_eq!(dmm.state().range(MeasurementFunction::DcVoltage), None);
}

#[test]
fn test_blank_and_autoranging_functions_write_nothing() {
    let (mut dmm, mock) = connected();
    dmm.set_function("per").unwrap();
    mock.clear_log();

    assert!(dmm.set_range("per", "1"));
    assert!(dmm.set_range("temp", "AUTO"));
    assert!(dmm.set_range("per", ""));
    assert!(!dmm.set_range("bogus", "20"));

    assert!(mock.written().is_empty());
}

#[test]
fn test_read_switches_function_and_range_once() {
    let (mut dmm, mock) = connected();
    mock.reply("FETCH?", ["22000"]);

    let first = dmm.read_resistance("kohm", Some("20000")).unwrap();
    let second = dmm.read_resistance("kohm", Some("20000")).unwrap();

    assert_eq!(first, 22.0);
    assert_eq!(second, 22.0);
    assert_eq!(
        mock.written(),
        vec![
            "FUNC res".to_string(),
            "RES:RANG 20000".to_string(),
            "FETCH?".to_string(),
            "FETCH?".to_string(),
        ]
    );
}

#[test]
fn test_unit_scaling_through_reads() {
    let (mut dmm, mock) = connected();

    mock.reply("FETCH?", ["1.5"]);
    assert_eq!(dmm.read_dc_voltage("mV", None).unwrap(), 1500.0);
    assert_eq!(dmm.read_ac_current("mA", None).unwrap(), 1500.0);

    mock.reply("FETCH?", ["4700000"]);
    assert_eq!(dmm.read_resistance("MΩ", None).unwrap(), 4.7);

    mock.reply("FETCH?", ["1000"]);
    assert_eq!(dmm.read_frequency("kHz", None).unwrap(), 1.0);

    mock.reply("FETCH?", ["0.002"]);
    assert_eq!(dmm.read_period("ms").unwrap(), 2.0);

    mock.reply("FETCH?", ["23.5"]);
    assert_eq!(dmm.read_temperature().unwrap(), 23.5);
    assert_eq!(mock.count_written("FUNC temp"), 1);
}

#[test]
fn test_measure_capability_delegates_to_read() {
    let (mut dmm, mock) = connected();
    mock.reply("FETCH?", ["0.75"]);

    let value = dmm.measure(MeasurementFunction::AcVoltage, "mV").unwrap();

    assert_eq!(value, 750.0);
    assert_eq!(dmm.active_function(), Some(MeasurementFunction::AcVoltage));
}

#[test]
fn test_nplc_for_supported_functions_only() {
    let (mut dmm, mock) = connected();

    assert!(!dmm.set_nplc(1.0), "no active function");

    dmm.set_function("volt:ac").unwrap();
    assert!(!dmm.set_nplc(1.0));

    dmm.set_function("volt:dc").unwrap();
    assert!(dmm.set_nplc(10.0));
    assert_eq!(dmm.nplc(), Some(10.0));

    dmm.set_function("temp").unwrap();
    assert!(dmm.set_nplc(0.1));

    assert_eq!(mock.count_written("VOLT:DC:NPLC 10"), 1);
    assert_eq!(mock.count_written("TEMP:NPLC 0.1"), 1);
    assert_eq!(mock.written().iter().filter(|c| c.contains("NPLC")).count(), 2);
    assert_eq!(dmm.state().nplc(MeasurementFunction::DcVoltage), Some(10.0));
}

#[test]
fn test_nplc_write_failure_not_cached() {
    let (mut dmm, mock) = connected();
    dmm.set_function("res").unwrap();
    mock.inject_next_failure();

    assert!(!dmm.set_nplc(10.0));
    assert_eq!(dmm.nplc(), None);
}
