//! Display-unit scaling for readings.
//!
//! The meter always reports base units (V, A, Ω, Hz, s). Unit names are
//! matched case-insensitively; anything unrecognized leaves the value as is.

use super::state::MeasurementFunction;

/// Factor converting a base-unit reading of `function` into `units`.
pub fn scale_factor(function: MeasurementFunction, units: &str) -> f64 {
    let units = units.trim().to_lowercase();
    match function {
        MeasurementFunction::DcVoltage | MeasurementFunction::AcVoltage => match units.as_str() {
            "mv" => 1e3,
            _ => 1.0,
        },
        MeasurementFunction::DcCurrent | MeasurementFunction::AcCurrent => match units.as_str() {
            "ma" => 1e3,
            _ => 1.0,
        },
        // Lower-case "m" is mega here; there is no milliohm unit.
        MeasurementFunction::Resistance => match units.as_str() {
            "kohm" | "kω" | "k" => 1e-3,
            "mohm" | "mω" | "m" => 1e-6,
            _ => 1.0,
        },
        MeasurementFunction::Frequency => match units.as_str() {
            "khz" => 1e-3,
            "mhz" => 1e-6,
            _ => 1.0,
        },
        MeasurementFunction::Period => match units.as_str() {
            "ms" => 1e3,
            "us" | "µs" | "μs" => 1e6,
            _ => 1.0,
        },
        MeasurementFunction::Temperature => 1.0,
    }
}

/// Convert a base-unit reading into `units`.
///
/// Down-scaling divides by the reciprocal so that `2200 Ω` is exactly `2.2 kΩ`.
pub fn scale(function: MeasurementFunction, units: &str, value: f64) -> f64 {
    match scale_factor(function, units) {
        f if f < 1.0 => value / f.recip(),
        f => value * f,
    }
}
