//! Poll pacing for callers that read the meter in a loop.
//!
//! Approximate reading rates (readings/s) of the 2831E:
//!
//! | Function                    | Slow | Medium | Fast |
//! |-----------------------------|------|--------|------|
//! | DCV, DCA, ACV, ACA, temp, Ω | 5    | 10     | 25   |
//! | Ω at 20 MΩ and above        | 1.3  | 2.6    | 5.6  |
//! | Frequency, period           | 1    | 2      | 3.9  |

use super::state::{MeasurementFunction, RangeSelector};
use std::time::Duration;

/// Delay when no function is active.
pub const DEFAULT_POLL: Duration = Duration::from_millis(200);
/// Lower bound while cooling off.
pub const COOLING_POLL: Duration = Duration::from_millis(1500);

const MIN_POLL_MS: u64 = 50;
const MAX_POLL_MS: u64 = 1200;
const HIGH_OHM_THRESHOLD: f64 = 20e6;

/// Reading speed implied by the integration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSpeed {
    /// 10 PLC and longer
    Slow,
    /// 1 PLC up to 10
    Medium,
    /// Below 1 PLC
    Fast,
}

impl ReadingSpeed {
    /// Classify an NPLC setting; unknown counts as medium.
    pub fn from_nplc(nplc: Option<f64>) -> Self {
        match nplc {
            Some(n) if n < 1.0 => ReadingSpeed::Fast,
            Some(n) if n >= 10.0 => ReadingSpeed::Slow,
            _ => ReadingSpeed::Medium,
        }
    }
}

fn rates(function: MeasurementFunction, range: Option<&RangeSelector>) -> (f64, f64, f64) {
    match function {
        MeasurementFunction::Frequency | MeasurementFunction::Period => (1.0, 2.0, 3.9),
        MeasurementFunction::Resistance
            if range
                .and_then(RangeSelector::as_f64)
                .is_some_and(|r| r >= HIGH_OHM_THRESHOLD) =>
        {
            (1.3, 2.6, 5.6)
        }
        _ => (5.0, 10.0, 25.0),
    }
}

/// Recommended delay between reads.
pub fn poll_interval(
    function: Option<MeasurementFunction>,
    nplc: Option<f64>,
    range: Option<&RangeSelector>,
    cooling: bool,
) -> Duration {
    let base = match function {
        None => DEFAULT_POLL,
        Some(function) => {
            let (slow, medium, fast) = rates(function, range);
            let rate = match ReadingSpeed::from_nplc(nplc) {
                ReadingSpeed::Slow => slow,
                ReadingSpeed::Medium => medium,
                ReadingSpeed::Fast => fast,
            };
            let ms = (1000.0 / rate) as u64;
            Duration::from_millis(ms.clamp(MIN_POLL_MS, MAX_POLL_MS))
        }
    };

    if cooling {
        base.max(COOLING_POLL)
    } else {
        base
    }
}
