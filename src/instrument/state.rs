//! Instrument state model: measurement functions, range selectors, trigger
//! sources and the per-function settings cache.
//!
//! The cache records the last value successfully written to the meter. It is
//! advisory; nothing here reads settings back from the hardware.

use crate::error::DmmError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Measurement functions of the 2831E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementFunction {
    /// DC voltage (`volt:dc`)
    DcVoltage,
    /// DC current (`curr:dc`)
    DcCurrent,
    /// AC voltage (`volt:ac`)
    AcVoltage,
    /// AC current (`curr:ac`)
    AcCurrent,
    /// Two-wire resistance (`res`)
    Resistance,
    /// Frequency (`freq`)
    Frequency,
    /// Period (`per`)
    Period,
    /// Temperature (`temp`)
    Temperature,
}

impl MeasurementFunction {
    /// Every supported function.
    pub const ALL: [MeasurementFunction; 8] = [
        MeasurementFunction::DcVoltage,
        MeasurementFunction::DcCurrent,
        MeasurementFunction::AcVoltage,
        MeasurementFunction::AcCurrent,
        MeasurementFunction::Resistance,
        MeasurementFunction::Frequency,
        MeasurementFunction::Period,
        MeasurementFunction::Temperature,
    ];

    /// Name used with `FUNC`.
    pub fn scpi_name(self) -> &'static str {
        match self {
            MeasurementFunction::DcVoltage => "volt:dc",
            MeasurementFunction::DcCurrent => "curr:dc",
            MeasurementFunction::AcVoltage => "volt:ac",
            MeasurementFunction::AcCurrent => "curr:ac",
            MeasurementFunction::Resistance => "res",
            MeasurementFunction::Frequency => "freq",
            MeasurementFunction::Period => "per",
            MeasurementFunction::Temperature => "temp",
        }
    }

    /// Command subsystem prefix, e.g. `VOLT:DC`.
    pub fn subsystem(self) -> &'static str {
        match self {
            MeasurementFunction::DcVoltage => "VOLT:DC",
            MeasurementFunction::DcCurrent => "CURR:DC",
            MeasurementFunction::AcVoltage => "VOLT:AC",
            MeasurementFunction::AcCurrent => "CURR:AC",
            MeasurementFunction::Resistance => "RES",
            MeasurementFunction::Frequency => "FREQ",
            MeasurementFunction::Period => "PER",
            MeasurementFunction::Temperature => "TEMP",
        }
    }

    /// Subsystem accepting `:RANG`. Period and temperature autorange.
    pub fn range_subsystem(self) -> Option<&'static str> {
        match self {
            MeasurementFunction::Period | MeasurementFunction::Temperature => None,
            other => Some(other.subsystem()),
        }
    }

    /// Subsystem accepting `:NPLC`.
    pub fn nplc_subsystem(self) -> Option<&'static str> {
        match self {
            MeasurementFunction::DcVoltage
            | MeasurementFunction::DcCurrent
            | MeasurementFunction::Resistance
            | MeasurementFunction::Temperature => Some(self.subsystem()),
            _ => None,
        }
    }

    /// Subsystem accepting `:REF` and `:REF:STAT`.
    pub fn reference_subsystem(self) -> Option<&'static str> {
        match self {
            MeasurementFunction::DcVoltage
            | MeasurementFunction::DcCurrent
            | MeasurementFunction::Resistance
            | MeasurementFunction::Frequency
            | MeasurementFunction::Period => Some(self.subsystem()),
            _ => None,
        }
    }

    /// Inclusive bounds a reference value must fall within.
    pub fn reference_bounds(self) -> Option<(f64, f64)> {
        match self {
            MeasurementFunction::DcVoltage => Some((-19999.0, 19999.0)),
            MeasurementFunction::DcCurrent => Some((-1999.0, 1999.0)),
            MeasurementFunction::Resistance => Some((-19999.0, 19999.0)),
            MeasurementFunction::Frequency | MeasurementFunction::Period => {
                Some((0.0, f64::INFINITY))
            }
            _ => None,
        }
    }
}

impl fmt::Display for MeasurementFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scpi_name())
    }
}

impl FromStr for MeasurementFunction {
    type Err = DmmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        MeasurementFunction::ALL
            .into_iter()
            .find(|f| f.scpi_name() == name)
            .ok_or_else(|| DmmError::UnsupportedFunction(s.to_string()))
    }
}

/// Range requested for a function.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeSelector {
    /// Autoranging (`<SUBSYS>:RANG:AUTO 1`)
    Auto,
    /// Fixed range, passed to the meter verbatim
    Value(String),
}

impl RangeSelector {
    /// Parse a user-supplied range. Blank input means "leave the range alone".
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else if text.eq_ignore_ascii_case("auto") {
            Some(RangeSelector::Auto)
        } else {
            Some(RangeSelector::Value(text.to_string()))
        }
    }

    /// Fixed range from a number.
    pub fn value(range: impl fmt::Display) -> Self {
        RangeSelector::Value(range.to_string())
    }

    /// Fixed range as a number, when it parses as one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RangeSelector::Auto => None,
            RangeSelector::Value(v) => v.parse().ok(),
        }
    }
}

impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSelector::Auto => f.write_str("AUTO"),
            RangeSelector::Value(v) => f.write_str(v),
        }
    }
}

/// Trigger sources (`TRIG:SOUR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerSource {
    /// Internal free-running trigger
    #[default]
    Immediate,
    /// Software trigger over the link (`*TRG`)
    Bus,
    /// Front-panel trigger key
    Manual,
}

impl TriggerSource {
    /// Wire code.
    pub fn scpi_code(self) -> &'static str {
        match self {
            TriggerSource::Immediate => "IMM",
            TriggerSource::Bus => "BUS",
            TriggerSource::Manual => "MAN",
        }
    }

    /// Accepts `IMM…`, `BUS…`, `MAN…` and `EXT…` in any case.
    pub fn from_alias(text: &str) -> Option<Self> {
        let name = text.trim().to_ascii_uppercase();
        if name.starts_with("IMM") {
            Some(TriggerSource::Immediate)
        } else if name.starts_with("BUS") {
            Some(TriggerSource::Bus)
        } else if name.starts_with("MAN") || name.starts_with("EXT") {
            Some(TriggerSource::Manual)
        } else {
            None
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scpi_code())
    }
}

/// Last written settings of one function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionSettings {
    /// Range selector
    pub range: Option<RangeSelector>,
    /// Integration time in power-line cycles
    pub nplc: Option<f64>,
    /// Reference offset
    pub reference: Option<f64>,
    /// Whether relative mode was switched on
    pub reference_enabled: bool,
}

/// Driver-side mirror of the meter configuration.
#[derive(Debug, Clone, Default)]
pub struct InstrumentState {
    settings: HashMap<MeasurementFunction, FunctionSettings>,
    active: Option<MeasurementFunction>,
    trigger_source: TriggerSource,
}

impl InstrumentState {
    /// Empty state: no active function, immediate trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Function most recently selected with `FUNC`.
    pub fn active(&self) -> Option<MeasurementFunction> {
        self.active
    }

    /// Record a successful function switch.
    pub fn set_active(&mut self, function: MeasurementFunction) {
        self.active = Some(function);
    }

    /// Cached settings of a function, if any were written.
    pub fn settings(&self, function: MeasurementFunction) -> Option<&FunctionSettings> {
        self.settings.get(&function)
    }

    /// Mutable settings of a function, created on first use.
    pub fn settings_mut(&mut self, function: MeasurementFunction) -> &mut FunctionSettings {
        self.settings.entry(function).or_default()
    }

    /// Cached range of a function.
    pub fn range(&self, function: MeasurementFunction) -> Option<&RangeSelector> {
        self.settings(function).and_then(|s| s.range.as_ref())
    }

    /// Cached NPLC of a function.
    pub fn nplc(&self, function: MeasurementFunction) -> Option<f64> {
        self.settings(function).and_then(|s| s.nplc)
    }

    /// Cached trigger source.
    pub fn trigger_source(&self) -> TriggerSource {
        self.trigger_source
    }

    /// Record a trigger source change.
    pub fn set_trigger_source(&mut self, source: TriggerSource) {
        self.trigger_source = source;
    }

    /// Forget everything; the meter is back at power-on defaults.
    pub fn invalidate(&mut self) {
        self.settings.clear();
        self.active = None;
        self.trigger_source = TriggerSource::default();
    }
}
