//! Hardware integration tests for the BK Precision 2831E
//!
//! These tests require a real meter connected to the system.
//! Run with: DMM_PORT=/dev/ttyUSB0 cargo test --test hardware_bk2831e_test --features hardware_tests -- --ignored --nocapture
//!
//! Hardware Setup:
//! - 2831E connected via its RS-232 / USB-serial bridge
//! - Meter baud rate matching `RUST_DMM_SERIAL__BAUD_RATE` (default 9600)
//! - Test leads shorted or open; readings are only checked for being finite

#![cfg(feature = "hardware_tests")]

use rust_dmm::adapters::SerialAdapter;
use rust_dmm::{Bk2831e, DmmConfig, IntegrationTime, TriggerControl, TriggerSource};

fn open() -> Bk2831e<SerialAdapter> {
    let port = std::env::var("DMM_PORT").expect("set DMM_PORT to the meter's serial port");
    let config = DmmConfig::load().expect("configuration");
    let mut dmm = Bk2831e::new(SerialAdapter::new(), config).expect("driver");
    dmm.connect(Some(&port)).expect("connect to 2831E");
    dmm
}

#[test]
#[ignore] // Hardware-only test
fn test_identity_and_dc_voltage() {
    let mut dmm = open();
    println!("Identity: {:?}", dmm.identity());

    let volts = dmm.read_dc_voltage("V", Some("AUTO")).expect("reading");
    println!("DC voltage: {volts} V");
    assert!(volts.is_finite());

    assert!(dmm.close());
}

#[test]
#[ignore]
fn test_nplc_and_pacing() {
    let mut dmm = open();
    dmm.set_function("volt:dc").expect("function");

    for nplc in [0.1, 1.0, 10.0] {
        assert!(dmm.set_nplc(nplc));
        let value = dmm.read_dc_voltage("mV", None).expect("reading");
        println!(
            "NPLC {nplc}: {value} mV, poll every {:?}",
            dmm.recommended_poll_interval()
        );
    }

    assert!(dmm.close());
}

#[test]
#[ignore]
fn test_bus_trigger() {
    let mut dmm = open();
    dmm.set_function("volt:dc").expect("function");

    assert!(dmm.set_trigger_source("BUS"));
    assert_eq!(dmm.get_trigger_source(), TriggerSource::Bus);
    assert!(dmm.trigger());
    let value = dmm.read_dc_voltage("V", None).expect("triggered reading");
    println!("Triggered reading: {value} V");

    assert!(dmm.set_trigger_source("IMM"));
    assert!(dmm.close());
}
