//! Serial driver for the BK Precision 2831E bench multimeter.
//!
//! The meter speaks line-terminated ASCII commands over RS-232 and is not a
//! quiet partner: it may echo commands, emit partial tokens or stall after a
//! burst. This library turns that link into trustworthy readings and keeps a
//! local mirror of the meter configuration so redundant commands are never
//! sent.
//!
//! - [`adapters`]: transports (serial port, scripted mock)
//! - [`instrument`]: line protocol, fetch engine, state model and driver
//! - [`config`]: layered configuration (defaults, TOML, environment)
//! - [`logging`]: subscriber setup for applications
//! - [`error`]: error types

pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;

pub use config::DmmConfig;
pub use error::{DmmError, DmmResult};
pub use instrument::{
    Bk2831e, Capability, IntegrationTime, MeasurementFunction, Multimeter, RangeSelector,
    RelativeReference, TriggerControl, TriggerSource,
};
