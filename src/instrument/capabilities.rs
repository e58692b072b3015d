//! Capability traits for the multimeter.
//!
//! Functions of the 2831E differ in what they accept: only some take a range,
//! an integration time or a reference offset. [`Capability`] answers that
//! question per [`MeasurementFunction`], and the traits below group the
//! operations behind each capability so callers can be written against them
//! instead of the concrete driver.

use super::state::{MeasurementFunction, TriggerSource};
use crate::error::DmmResult;

/// Optional per-function features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Fixed or auto range (`:RANG`)
    Range,
    /// Integration time in power-line cycles (`:NPLC`)
    IntegrationTime,
    /// Relative reference offset (`:REF`)
    Reference,
}

impl MeasurementFunction {
    /// Whether this function accepts `capability`.
    pub fn supports(self, capability: Capability) -> bool {
        match capability {
            Capability::Range => self.range_subsystem().is_some(),
            Capability::IntegrationTime => self.nplc_subsystem().is_some(),
            Capability::Reference => self.reference_subsystem().is_some(),
        }
    }

    /// All capabilities this function accepts.
    pub fn capabilities(self) -> Vec<Capability> {
        [
            Capability::Range,
            Capability::IntegrationTime,
            Capability::Reference,
        ]
        .into_iter()
        .filter(|c| self.supports(*c))
        .collect()
    }
}

/// Basic measurement access.
pub trait Multimeter {
    /// Function currently selected on the meter.
    fn active_function(&self) -> Option<MeasurementFunction>;

    /// Switch to `function` if needed and take one reading in `units`.
    fn measure(&mut self, function: MeasurementFunction, units: &str) -> DmmResult<f64>;
}

/// Integration time of the active function.
pub trait IntegrationTime {
    /// Set NPLC on the active function. `false` if unsupported or the write failed.
    fn set_nplc(&mut self, nplc: f64) -> bool;

    /// Last NPLC written for the active function.
    fn nplc(&self) -> Option<f64>;
}

/// Relative (REL) measurements of the active function.
pub trait RelativeReference {
    /// Turn relative mode on.
    fn enable_reference(&mut self) -> bool;

    /// Turn relative mode off.
    fn disable_reference(&mut self) -> bool;

    /// Write the reference offset.
    fn set_reference(&mut self, value: f64) -> bool;

    /// Read the reference offset back from the meter.
    fn get_reference(&mut self) -> DmmResult<f64>;

    /// Take one reading and use it as the reference offset.
    fn acquire_reference_from_input(&mut self) -> DmmResult<f64>;
}

/// Trigger subsystem.
pub trait TriggerControl {
    /// Select the trigger source by name (`IMM…`, `BUS…`, `MAN…`, `EXT…`).
    fn set_trigger_source(&mut self, source: &str) -> bool;

    /// Trigger source reported by the meter, or the cached one.
    fn get_trigger_source(&mut self) -> TriggerSource;

    /// Arm and fire a bus trigger.
    fn trigger(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use MeasurementFunction::*;

    #[test]
    fn test_capability_table() {
        assert_eq!(
            DcVoltage.capabilities(),
            vec![
                Capability::Range,
                Capability::IntegrationTime,
                Capability::Reference
            ]
        );
        assert_eq!(AcVoltage.capabilities(), vec![Capability::Range]);
        assert_eq!(Temperature.capabilities(), vec![Capability::IntegrationTime]);
        assert_eq!(Period.capabilities(), vec![Capability::Reference]);
        assert!(Frequency.supports(Capability::Range));
        assert!(!Frequency.supports(Capability::IntegrationTime));
    }

    #[test]
    fn test_reference_bounds_match_capability() {
        for function in MeasurementFunction::ALL {
            assert_eq!(
                function.supports(Capability::Reference),
                function.reference_bounds().is_some()
            );
        }
    }
}
