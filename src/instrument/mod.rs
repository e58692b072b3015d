//! Instrument driver for the BK Precision 2831E.
//!
//! - [`scpi`]: line protocol (send, query, echo absorption, link resets)
//! - [`fetch`]: robust numeric fetch with retry, backoff and cooloff
//! - [`state`]: measurement functions, range selectors and the settings cache
//! - [`units`]: display-unit scaling of readings
//! - [`pacing`]: recommended poll interval
//! - [`capabilities`]: capability traits implemented by the driver
//! - [`bk2831e`]: the driver itself

pub mod bk2831e;
pub mod capabilities;
pub mod fetch;
pub mod pacing;
pub mod scpi;
pub mod state;
pub mod units;

pub use bk2831e::Bk2831e;
pub use capabilities::{Capability, IntegrationTime, Multimeter, RelativeReference, TriggerControl};
pub use fetch::{FetchEngine, FetchPolicy};
pub use state::{FunctionSettings, InstrumentState, MeasurementFunction, RangeSelector, TriggerSource};
