//! BK Precision 2831E bench multimeter driver
//!
//! The driver owns one [`HardwareAdapter`] and layers on top of it:
//!
//! - a connection manager (`connect`, `close`, `set_baud_rate`) that validates
//!   the `*IDN?` reply against a model pattern,
//! - a settings cache so that function and range changes are only written
//!   when they differ from what the meter already has,
//! - the robust fetch engine for readings,
//! - the capability traits from [`super::capabilities`].
//!
//! ## Configuration
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! timeout_ms = 1500
//!
//! [identity]
//! model_pattern = '2831\s*E'
//!
//! [fetch]
//! max_attempts = 3
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use rust_dmm::adapters::SerialAdapter;
//! use rust_dmm::config::DmmConfig;
//! use rust_dmm::instrument::Bk2831e;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = DmmConfig::load_from("config/dmm.toml")?;
//!     let mut dmm = Bk2831e::new(SerialAdapter::new(), config)?;
//!     dmm.connect(Some("/dev/ttyUSB0"))?;
//!     let volts = dmm.read_dc_voltage("mV", Some("2"))?;
//!     println!("{volts} mV");
//!     dmm.close();
//!     Ok(())
//! }
//! ```

use super::capabilities::{IntegrationTime, Multimeter, RelativeReference, TriggerControl};
use super::fetch::{FetchEngine, FetchState};
use super::pacing;
use super::scpi::ScpiLink;
use super::state::{InstrumentState, MeasurementFunction, RangeSelector, TriggerSource};
use super::units;
use crate::adapters::{HardwareAdapter, LinkSettings, SerialAdapter};
use crate::config::{ConfigError, DmmConfig};
use crate::error::{DmmError, DmmResult};
use regex::{Regex, RegexBuilder};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Span};

const FETCH: &str = "FETCH?";
const IDENTIFY: &str = "*IDN?";

/// BK Precision 2831E driver.
pub struct Bk2831e<A: HardwareAdapter = SerialAdapter> {
    link: ScpiLink<A>,
    config: DmmConfig,
    port: Option<String>,
    model_pattern: Regex,
    fetch: FetchEngine,
    state: InstrumentState,
    span: Span,
}

impl<A: HardwareAdapter> Bk2831e<A> {
    /// Create a disconnected driver.
    ///
    /// # Errors
    ///
    /// Returns [`DmmError::Config`] if the configuration does not validate.
    pub fn new(adapter: A, config: DmmConfig) -> DmmResult<Self> {
        config.validate()?;
        let model_pattern = RegexBuilder::new(&config.identity.model_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(Self {
            link: ScpiLink::new(adapter),
            port: config.serial.port.clone(),
            model_pattern,
            fetch: FetchEngine::new(config.fetch.clone()),
            state: InstrumentState::new(),
            span: info_span!("dmm"),
            config,
        })
    }

    /// Log inside `span` instead of the default `dmm` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &DmmConfig {
        &self.config
    }

    /// Cached instrument state.
    pub fn state(&self) -> &InstrumentState {
        &self.state
    }

    /// Fetch failure bookkeeping.
    pub fn fetch_state(&self) -> &FetchState {
        self.fetch.state()
    }

    /// Underlying adapter.
    pub fn adapter(&self) -> &A {
        self.link.adapter()
    }

    /// Whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    /// Port used by the next `connect` without an override.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Configured host-side baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.config.serial.baud_rate
    }

    /// Model string matched on the live connection.
    pub fn identity(&self) -> Option<&str> {
        self.link
            .connection()
            .and_then(|c| c.identity.as_deref())
    }

    fn serial_timeout(&self) -> Duration {
        self.link
            .connection()
            .map_or_else(|| self.config.serial.timeout(), |c| c.timeout)
    }

    // ------------------------------------------------------------------
    // Connection manager
    // ------------------------------------------------------------------

    /// Query `*IDN?` (once more on silence) and match the model pattern.
    fn identify(&mut self) -> DmmResult<String> {
        let timeout = self.serial_timeout();
        let mut reply = self.link.query(IDENTIFY, timeout)?;
        if reply.is_empty() {
            debug!("No reply to *IDN?; retrying once");
            reply = self.link.query(IDENTIFY, timeout)?;
        }

        if reply.is_empty() {
            return Err(DmmError::IdentityMismatch {
                expected: self.config.identity.model_pattern.clone(),
                actual: None,
            });
        }

        match self.model_pattern.find(&reply) {
            Some(m) => Ok(m.as_str().to_string()),
            None => Err(DmmError::IdentityMismatch {
                expected: self.config.identity.model_pattern.clone(),
                actual: Some(reply),
            }),
        }
    }

    /// Open the link and validate the meter's identity.
    ///
    /// An existing connection is re-validated and kept when it still answers.
    /// Otherwise the port is `port_override`, else the remembered port.
    pub fn connect(&mut self, port_override: Option<&str>) -> DmmResult<()> {
        let _span = self.span.clone().entered();

        if self.link.is_open() {
            match self.identify() {
                Ok(model) => {
                    if let Some(connection) = self.link.connection_mut() {
                        connection.identity = Some(model);
                    }
                    info!(
                        port = self.port.as_deref().unwrap_or_default(),
                        baud = self.config.serial.baud_rate,
                        "Already connected"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Existing connection failed identity check; reopening");
                    self.link.close();
                }
            }
        }

        if let Some(port) = port_override {
            self.port = Some(port.to_string());
        }
        let port = self.port.clone().ok_or(DmmError::NoPortAvailable)?;

        let settings = LinkSettings::new(
            port.clone(),
            self.config.serial.baud_rate,
            self.config.serial.timeout(),
        );
        if let Err(e) = self.link.open(&settings) {
            warn!(port = %port, error = %e, "Serial open failed");
            return Err(e);
        }
        self.state.invalidate();
        std::thread::sleep(self.config.serial.settle());

        match self.identify() {
            Ok(model) => {
                info!(port = %port, baud = settings.baud_rate, model = %model, "Connected");
                if let Some(connection) = self.link.connection_mut() {
                    connection.identity = Some(model);
                }
                Ok(())
            }
            Err(e) => {
                warn!(port = %port, error = %e, "Identity check failed");
                self.link.close();
                Err(e)
            }
        }
    }

    /// Reset the meter to local defaults and close the link.
    ///
    /// Returns `false` when there was nothing to close.
    pub fn close(&mut self) -> bool {
        let _span = self.span.clone().entered();

        if !self.link.is_open() {
            return false;
        }
        if let Err(e) = self.link.send("*RST") {
            debug!(error = %e, "*RST on close failed");
        }
        std::thread::sleep(self.config.serial.close_pause());
        self.link.close();
        self.state.invalidate();
        info!("Disconnected");
        true
    }

    /// Change the host-side baud rate.
    ///
    /// Applied to an open link in place when the adapter allows it; otherwise
    /// it takes effect on the next connect.
    pub fn set_baud_rate(&mut self, baud_rate: u32) {
        let _span = self.span.clone().entered();

        if baud_rate == 0 {
            warn!(baud_rate, "Invalid baud rate");
            return;
        }
        if baud_rate == self.config.serial.baud_rate {
            return;
        }
        self.config.serial.baud_rate = baud_rate;
        info!(baud_rate, "Using baud rate");

        if !self.link.is_open() {
            return;
        }
        match self.link.adapter_mut().set_baud_rate(baud_rate) {
            Ok(()) => {
                if let Some(connection) = self.link.connection_mut() {
                    connection.baud_rate = baud_rate;
                }
                debug!("Applied baud rate to open port");
                std::thread::sleep(self.config.serial.baud_settle());
            }
            Err(e) => warn!(
                error = %e,
                "Could not apply baud rate to open port; reconnect to use new setting"
            ),
        }
    }

    // ------------------------------------------------------------------
    // Function and range
    // ------------------------------------------------------------------

    /// Select a function by its wire name (`volt:dc`, `res`, ...).
    pub fn set_function(&mut self, name: &str) -> DmmResult<()> {
        let function: MeasurementFunction = name.parse()?;
        self.select_function(function)
    }

    /// Send `FUNC` unless `function` is already active.
    pub fn select_function(&mut self, function: MeasurementFunction) -> DmmResult<()> {
        if self.state.active() == Some(function) {
            return Ok(());
        }
        let _span = self.span.clone().entered();
        self.link.send_absorbing_echo(
            &format!("FUNC {}", function.scpi_name()),
            self.config.serial.echo_timeout(),
        )?;
        self.state.set_active(function);
        debug!(%function, "Function selected");
        Ok(())
    }

    /// Write a range if `function` is active and the cache differs.
    ///
    /// `Ok(false)` means the request was skipped.
    fn apply_range(
        &mut self,
        function: MeasurementFunction,
        selector: &RangeSelector,
    ) -> DmmResult<bool> {
        let Some(subsystem) = function.range_subsystem() else {
            return Ok(true);
        };
        if self.state.active() != Some(function) {
            debug!(%function, "Range skipped; function not active");
            return Ok(false);
        }
        if self.state.range(function) == Some(selector) {
            return Ok(true);
        }

        let command = match selector {
            RangeSelector::Auto => format!("{subsystem}:RANG:AUTO 1"),
            RangeSelector::Value(v) => format!("{subsystem}:RANG {v}"),
        };
        self.link
            .send_absorbing_echo(&command, self.config.serial.echo_timeout())?;
        self.state.settings_mut(function).range = Some(selector.clone());
        debug!(%function, range = %selector, "Range set");
        Ok(true)
    }

    /// Set the range of `function`.
    ///
    /// Blank ranges, cached ranges and functions without a range setting are
    /// accepted without a write. Returns `false` for unknown functions, for a
    /// function that is not active, or when the write fails.
    pub fn set_range(&mut self, function: &str, range: &str) -> bool {
        let _span = self.span.clone().entered();

        let Ok(function) = function.parse::<MeasurementFunction>() else {
            debug!(function, "Range for unknown function ignored");
            return false;
        };
        let Some(selector) = RangeSelector::parse(range) else {
            return true;
        };
        match self.apply_range(function, &selector) {
            Ok(applied) => applied,
            Err(e) => {
                warn!(%function, error = %e, "set_range failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    /// Take one reading of `function` in `units`, selecting function and
    /// range first when needed.
    pub fn read(
        &mut self,
        function: MeasurementFunction,
        units: &str,
        range: Option<&str>,
    ) -> DmmResult<f64> {
        self.select_function(function)?;
        if let Some(selector) = range.and_then(RangeSelector::parse) {
            self.apply_range(function, &selector)?;
        }

        let _span = self.span.clone().entered();
        let timeout = self.serial_timeout();
        match self.fetch.fetch(&mut self.link, FETCH, timeout) {
            Ok(value) => Ok(units::scale(function, units, value)),
            Err(e) => {
                warn!(%function, error = %e, "Reading failed");
                Err(e)
            }
        }
    }

    /// DC voltage in `V` or `mV`.
    pub fn read_dc_voltage(&mut self, units: &str, range: Option<&str>) -> DmmResult<f64> {
        self.read(MeasurementFunction::DcVoltage, units, range)
    }

    /// DC current in `A` or `mA`.
    pub fn read_dc_current(&mut self, units: &str, range: Option<&str>) -> DmmResult<f64> {
        self.read(MeasurementFunction::DcCurrent, units, range)
    }

    /// AC voltage in `V` or `mV`.
    pub fn read_ac_voltage(&mut self, units: &str, range: Option<&str>) -> DmmResult<f64> {
        self.read(MeasurementFunction::AcVoltage, units, range)
    }

    /// AC current in `A` or `mA`.
    pub fn read_ac_current(&mut self, units: &str, range: Option<&str>) -> DmmResult<f64> {
        self.read(MeasurementFunction::AcCurrent, units, range)
    }

    /// Resistance in `ohm`, `kohm` or `Mohm`.
    pub fn read_resistance(&mut self, units: &str, range: Option<&str>) -> DmmResult<f64> {
        self.read(MeasurementFunction::Resistance, units, range)
    }

    /// Frequency in `Hz`, `kHz` or `MHz`.
    pub fn read_frequency(&mut self, units: &str, range: Option<&str>) -> DmmResult<f64> {
        self.read(MeasurementFunction::Frequency, units, range)
    }

    /// Period in `s`, `ms` or `us`.
    pub fn read_period(&mut self, units: &str) -> DmmResult<f64> {
        self.read(MeasurementFunction::Period, units, None)
    }

    /// Temperature in the meter's configured unit.
    pub fn read_temperature(&mut self) -> DmmResult<f64> {
        self.read(MeasurementFunction::Temperature, "", None)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Whether the driver is backing off after a failed fetch.
    pub fn is_cooling(&self) -> bool {
        self.fetch.is_cooling()
    }

    /// Delay a polling caller should wait before the next reading.
    pub fn recommended_poll_interval(&self) -> Duration {
        let active = self.state.active();
        pacing::poll_interval(
            active,
            active.and_then(|f| self.state.nplc(f)),
            active.and_then(|f| self.state.range(f)),
            self.is_cooling(),
        )
    }

    /// Active function and the subsystem for one of its optional settings.
    fn active_subsystem(
        &self,
        lookup: fn(MeasurementFunction) -> Option<&'static str>,
    ) -> Option<(MeasurementFunction, &'static str)> {
        let function = self.state.active()?;
        lookup(function).map(|subsystem| (function, subsystem))
    }
}

impl<A: HardwareAdapter> Multimeter for Bk2831e<A> {
    fn active_function(&self) -> Option<MeasurementFunction> {
        self.state.active()
    }

    fn measure(&mut self, function: MeasurementFunction, units: &str) -> DmmResult<f64> {
        self.read(function, units, None)
    }
}

impl<A: HardwareAdapter> IntegrationTime for Bk2831e<A> {
    fn set_nplc(&mut self, nplc: f64) -> bool {
        let _span = self.span.clone().entered();

        let Some((function, subsystem)) =
            self.active_subsystem(MeasurementFunction::nplc_subsystem)
        else {
            return false;
        };
        match self.link.send_absorbing_echo(
            &format!("{subsystem}:NPLC {nplc}"),
            self.config.serial.echo_timeout(),
        ) {
            Ok(()) => {
                self.state.settings_mut(function).nplc = Some(nplc);
                debug!(%function, nplc, "NPLC set");
                true
            }
            Err(e) => {
                warn!(%function, error = %e, "set_nplc failed");
                false
            }
        }
    }

    fn nplc(&self) -> Option<f64> {
        self.state.active().and_then(|f| self.state.nplc(f))
    }
}

impl<A: HardwareAdapter> Bk2831e<A> {
    fn set_reference_state(&mut self, enabled: bool) -> bool {
        let _span = self.span.clone().entered();

        let Some((function, subsystem)) =
            self.active_subsystem(MeasurementFunction::reference_subsystem)
        else {
            warn!("Reference not supported for this mode");
            return false;
        };
        let state = if enabled { "ON" } else { "OFF" };
        match self.link.send_absorbing_echo(
            &format!("{subsystem}:REF:STAT {state}"),
            self.config.serial.echo_timeout(),
        ) {
            Ok(()) => {
                self.state.settings_mut(function).reference_enabled = enabled;
                true
            }
            Err(e) => {
                warn!(%function, error = %e, "Reference state change failed");
                false
            }
        }
    }
}

impl<A: HardwareAdapter> RelativeReference for Bk2831e<A> {
    fn enable_reference(&mut self) -> bool {
        self.set_reference_state(true)
    }

    fn disable_reference(&mut self) -> bool {
        self.set_reference_state(false)
    }

    fn set_reference(&mut self, value: f64) -> bool {
        let _span = self.span.clone().entered();

        let Some((function, subsystem)) =
            self.active_subsystem(MeasurementFunction::reference_subsystem)
        else {
            warn!("Reference not supported for this mode");
            return false;
        };
        match self.link.send_absorbing_echo(
            &format!("{subsystem}:REF {value}"),
            self.config.serial.echo_timeout(),
        ) {
            Ok(()) => {
                self.state.settings_mut(function).reference = Some(value);
                true
            }
            Err(e) => {
                warn!(%function, error = %e, "set_reference failed");
                false
            }
        }
    }

    fn get_reference(&mut self) -> DmmResult<f64> {
        let (_, subsystem) = self
            .active_subsystem(MeasurementFunction::reference_subsystem)
            .ok_or_else(|| DmmError::Unavailable("reference not supported".to_string()))?;

        let timeout = self.serial_timeout();
        let reply = self
            .link
            .query(&format!("{subsystem}:REF?"), timeout)
            .map_err(|e| DmmError::Unavailable(e.to_string()))?;
        reply
            .trim()
            .parse::<f64>()
            .map_err(|_| DmmError::Unavailable(format!("unparsable reference '{}'", reply)))
    }

    fn acquire_reference_from_input(&mut self) -> DmmResult<f64> {
        let _span = self.span.clone().entered();

        let Some((function, _)) = self.active_subsystem(MeasurementFunction::reference_subsystem)
        else {
            warn!("Reference acquire not supported for this mode");
            return Err(DmmError::Unavailable("reference not supported".to_string()));
        };

        let timeout = self.serial_timeout();
        let value = self
            .fetch
            .fetch(&mut self.link, FETCH, timeout)
            .map_err(|e| {
                warn!(error = %e, "Failed to read value for reference");
                DmmError::Unavailable(e.to_string())
            })?;

        if let Some((lo, hi)) = function.reference_bounds() {
            if !(lo..=hi).contains(&value) {
                warn!(value, lo, hi, "Value outside reference range");
                return Err(DmmError::Unavailable(format!(
                    "{value} outside reference range {lo}..{hi}"
                )));
            }
        }

        if !self.set_reference(value) {
            return Err(DmmError::Unavailable("reference write failed".to_string()));
        }
        Ok(value)
    }
}

impl<A: HardwareAdapter> TriggerControl for Bk2831e<A> {
    fn set_trigger_source(&mut self, source: &str) -> bool {
        let _span = self.span.clone().entered();

        if !self.link.is_open() {
            warn!("set_trigger_source called while not connected");
            return false;
        }
        let Some(trigger) = TriggerSource::from_alias(source) else {
            warn!(source, "Unknown trigger source");
            return false;
        };
        match self.link.send_absorbing_echo(
            &format!("TRIG:SOUR {}", trigger.scpi_code()),
            self.config.serial.echo_timeout(),
        ) {
            Ok(()) => {
                self.state.set_trigger_source(trigger);
                debug!(%trigger, "Trigger source set");
                true
            }
            Err(e) => {
                warn!(error = %e, "set_trigger_source failed");
                false
            }
        }
    }

    fn get_trigger_source(&mut self) -> TriggerSource {
        let cached = self.state.trigger_source();
        if !self.link.is_open() {
            return cached;
        }

        let _span = self.span.clone().entered();
        let timeout = self.serial_timeout();
        match self.link.query("TRIG:SOUR?", timeout) {
            Ok(reply) if !reply.is_empty() => match TriggerSource::from_alias(&reply) {
                Some(source) => {
                    self.state.set_trigger_source(source);
                    source
                }
                None => {
                    debug!(reply = %reply, "Unrecognized trigger source reply");
                    cached
                }
            },
            Ok(_) => cached,
            Err(e) => {
                warn!(error = %e, "get_trigger_source failed");
                cached
            }
        }
    }

    fn trigger(&mut self) -> bool {
        let _span = self.span.clone().entered();

        if !self.link.is_open() {
            warn!("trigger called while not connected");
            return false;
        }
        match self.link.send("INIT").and_then(|()| self.link.send("*TRG")) {
            Ok(()) => {
                debug!("INIT + *TRG sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "trigger failed");
                false
            }
        }
    }
}
