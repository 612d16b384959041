//! Sensor entity and update orchestration.
//!
//! A [`Sensor`] owns the identity and calibration of one measurement point
//! and the [`Driver`] bound to its hardware. Every sensor follows the same
//! cycle no matter how its driver reads the hardware:
//!
//! 1. [`Sensor::update`] does nothing while the last reading is younger than
//!    the update timeout, unless forced.
//! 2. The driver acquires one raw sample in the native unit.
//! 3. Failures are logged and swallowed; the previous reading stays.
//! 4. Samples outside `[limit_min, limit_max]` are logged and discarded.
//! 5. Anything else is committed together with the time of the read.
//!
//! Display units are applied on the way out ([`Sensor::get_current`]), never
//! stored.
//!
//! # Example
//! ```rust,no_run
//! use terrarium_sensors::{Sensor, SensorConfig, SensorContext, SensorDefinition};
//!
//! let ctx = SensorContext::linux(SensorConfig::from_env(), terrarium_sensors::units::metric())?;
//! let mut sensor = Sensor::new(
//!     SensorDefinition::new("w1", "temperature", "28-0000075c0a6b").with_name("Basking spot"),
//!     &ctx,
//! )?;
//! sensor.update(false);
//! println!("{}{}", sensor.get_current(), sensor.get_indicator());
//! # Ok::<(), terrarium_sensors::Error>(())
//! ```

use crate::config::SensorConfig;
use crate::drivers::Driver;
use crate::error::{AcquireError, LoadingError, Result};
use crate::hal::Hardware;
use crate::types::{HardwareType, MeasurementKind, SensorData};
use crate::units::{self, IndicatorFn};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Alarm window pinned on binary probes, just outside `{0, 1}`.
pub const BINARY_ALARM_MIN: f64 = -1.05;
pub const BINARY_ALARM_MAX: f64 = 1.05;
/// Valid range pinned on binary probes.
pub const BINARY_LIMIT_MIN: f64 = -1.1;
pub const BINARY_LIMIT_MAX: f64 = 1.1;

const DEFAULT_LIMIT_MAX: f64 = 100.0;
/// 10 m in centimeters.
const DISTANCE_LIMIT_MAX: f64 = 100000.0;

/// Stable id of a measurement point.
///
/// The address is upper-cased and stripped of `-`, `.`, `:` and `_` before
/// hashing, so `28-0000075c0a6b` and `280000075C0A6B` name the same probe.
///
/// ```
/// # use terrarium_sensors::{sensor_id, MeasurementKind};
/// assert_eq!(
///     sensor_id("28-0000075c0a6b", MeasurementKind::Temperature),
///     sensor_id("280000075C0A6B", MeasurementKind::Temperature),
/// );
/// ```
pub fn sensor_id(address: &str, kind: MeasurementKind) -> String {
    let normalized: String = address
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '.' | ':' | '_'))
        .collect::<String>()
        .to_uppercase();
    let hash = blake3::hash(format!("{}{}", normalized, kind.as_str()).as_bytes());
    hex::encode(&hash.as_bytes()[..16])
}

/// What a sensor is made from: the same fields a configuration file holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    /// Generated from address and kind when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "hardwaretype")]
    pub hardware: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    #[serde(default)]
    pub name: String,
}

impl SensorDefinition {
    pub fn new(hardware: &str, kind: &str, address: &str) -> Self {
        Self {
            id: None,
            hardware: hardware.to_string(),
            kind: kind.to_string(),
            address: address.to_string(),
            name: String::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// Everything sensors share: the hardware provider, the display unit policy
/// and the configuration.
#[derive(Clone)]
pub struct SensorContext {
    pub hardware: Arc<dyn Hardware>,
    pub indicator: IndicatorFn,
    pub config: Arc<SensorConfig>,
}

impl SensorContext {
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` does not
    /// validate.
    pub fn new(
        hardware: Arc<dyn Hardware>,
        indicator: IndicatorFn,
        config: SensorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            hardware,
            indicator,
            config: Arc::new(config),
        })
    }

    /// Context backed by the kernel interfaces of this machine.
    #[cfg(unix)]
    pub fn linux(config: SensorConfig, indicator: IndicatorFn) -> Result<Self> {
        let hardware = Arc::new(crate::hal::LinuxHardware::new(&config));
        Self::new(hardware, indicator, config)
    }

    /// Same context with another display unit policy.
    pub fn with_indicator(&self, indicator: IndicatorFn) -> Self {
        Self {
            indicator,
            ..self.clone()
        }
    }
}

impl fmt::Debug for SensorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Where a sensor is in its update cycle.
///
/// A read in progress is not observable: [`Sensor::update`] holds the sensor
/// exclusively until it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    /// The last reading is younger than the update timeout.
    Fresh,
    /// The next `update()` will read the hardware.
    Stale,
    /// Stopped; the hardware is released and `update()` does nothing.
    Terminated,
}

/// One measurement point bound to its hardware.
pub struct Sensor {
    id: String,
    hardware_type: HardwareType,
    kind: MeasurementKind,
    address: String,
    name: String,
    current: f64,
    last_update: DateTime<Utc>,
    alarm_min: f64,
    alarm_max: f64,
    limit_min: f64,
    limit_max: f64,
    indicator: IndicatorFn,
    update_timeout: std::time::Duration,
    driver: Option<Driver>,
}

impl Sensor {
    /// Binds a sensor to its hardware and takes the first reading.
    ///
    /// # Errors
    ///
    /// Any [`LoadingError`]: unknown hardware or measurement type, a
    /// measurement the hardware cannot take, an unusable address, a missing
    /// or non-executable script, or pins that cannot be claimed. A failing
    /// first reading is not an error.
    pub fn new(definition: SensorDefinition, ctx: &SensorContext) -> Result<Self> {
        let hardware_type: HardwareType = definition
            .hardware
            .parse()
            .map_err(LoadingError::UnknownHardware)?;
        let kind: MeasurementKind = definition
            .kind
            .parse()
            .map_err(LoadingError::UnknownMeasurement)?;
        let address = definition.address.trim().to_string();

        let driver = Driver::bind(hardware_type, kind, &address, &ctx.hardware, &ctx.config)?;

        let id = definition
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| sensor_id(&address, kind));

        let mut sensor = Self {
            id,
            hardware_type,
            kind,
            address,
            name: definition.name,
            current: 0.0,
            last_update: DateTime::<Utc>::UNIX_EPOCH,
            alarm_min: 0.0,
            alarm_max: 0.0,
            limit_min: 0.0,
            limit_max: DEFAULT_LIMIT_MAX,
            indicator: Arc::clone(&ctx.indicator),
            update_timeout: ctx.config.update_timeout,
            driver: Some(driver),
        };
        if hardware_type == HardwareType::HcSr04 {
            sensor.limit_max = DISTANCE_LIMIT_MAX;
        }
        if sensor.is_binary() {
            sensor.alarm_min = BINARY_ALARM_MIN;
            sensor.alarm_max = BINARY_ALARM_MAX;
            sensor.limit_min = BINARY_LIMIT_MIN;
            sensor.limit_max = BINARY_LIMIT_MAX;
        }

        info!(
            "Loaded {} {} sensor '{}' on location {}.",
            sensor.hardware_type, sensor.kind, sensor.name, sensor.address
        );
        sensor.update(false);
        Ok(sensor)
    }

    /// Reads the hardware if the last reading is stale or `force` is set.
    ///
    /// Returns `true` when a new reading was committed. Failed reads and
    /// out-of-range samples return `false` and leave the sensor unchanged.
    pub fn update(&mut self, force: bool) -> bool {
        let now = Utc::now();
        if self.driver.is_none() {
            debug!("Sensor '{}' is stopped, not updating", self.name);
            return false;
        }
        if !force && !self.is_stale_at(now) {
            return false;
        }

        debug!(
            "Updating {} {} sensor '{}'",
            self.hardware_type, self.kind, self.name
        );
        let old_current = self.get_current();
        let started = Instant::now();

        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| driver.acquire()));

        let sample = match outcome {
            Ok(Ok(sample)) => sample,
            Ok(Err(AcquireError::NoReading)) => {
                debug!(
                    "{} {} sensor '{}' has no fresh reading, keeping {}",
                    self.hardware_type, self.kind, self.name, self.current
                );
                return false;
            }
            Ok(Err(e)) if e.is_absent() => {
                warn!(
                    "{} {} sensor '{}' at {} is not available: {}",
                    self.hardware_type, self.kind, self.name, self.address, e
                );
                return false;
            }
            Ok(Err(e)) => {
                error!(
                    "Error updating {} {} sensor '{}' with error: {}",
                    self.hardware_type, self.kind, self.name, e
                );
                return false;
            }
            Err(_) => {
                error!(
                    "Driver of {} {} sensor '{}' panicked during read",
                    self.hardware_type, self.kind, self.name
                );
                return false;
            }
        };

        let indicator = self.get_indicator();
        if !(self.limit_min..=self.limit_max).contains(&sample) {
            warn!(
                "Measured value {}{} from {} sensor '{}' is outside valid range {:.2}{} - {:.2}{} in {:.5} seconds.",
                sample,
                indicator,
                self.kind,
                self.name,
                self.limit_min,
                indicator,
                self.limit_max,
                indicator,
                started.elapsed().as_secs_f64()
            );
            return false;
        }

        self.current = sample;
        self.last_update = now;
        info!(
            "Updated {} sensor '{}' from {:.2}{} to {:.2}{} in {:.5} seconds",
            self.kind,
            self.name,
            old_current,
            indicator,
            self.get_current(),
            indicator,
            started.elapsed().as_secs_f64()
        );
        true
    }

    /// Stops the sensor and releases any pins it holds. Safe to call twice.
    pub fn stop(&mut self) {
        if let Some(driver) = self.driver.take() {
            drop(driver);
            info!(
                "Cleaning up sensor {} at location {}",
                self.name, self.address
            );
        }
    }

    pub fn state(&self) -> SensorState {
        if self.driver.is_none() {
            SensorState::Terminated
        } else if self.is_stale_at(Utc::now()) {
            SensorState::Stale
        } else {
            SensorState::Fresh
        }
    }

    fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_update)
            .to_std()
            .map(|age| age > self.update_timeout)
            .unwrap_or(false)
    }

    fn is_binary(&self) -> bool {
        self.hardware_type == HardwareType::YtxxDigital
    }

    /// Current value in display units.
    pub fn get_current(&self) -> f64 {
        units::to_display(self.current, &self.get_indicator())
    }

    pub fn get_indicator(&self) -> String {
        (self.indicator)(self.kind)
    }

    /// Whether the current value is outside the open alarm window.
    ///
    /// The display value is compared against the thresholds as stored, so
    /// with Fahrenheit or inches the thresholds must be given in those units.
    pub fn get_alarm(&self) -> bool {
        let current = self.get_current();
        !(self.alarm_min < current && current < self.alarm_max)
    }

    /// Snapshot for the API and automation layers.
    pub fn get_data(&self) -> SensorData {
        SensorData {
            id: self.id.clone(),
            hardware_type: self.hardware_type,
            address: self.address.clone(),
            kind: self.kind,
            indicator: self.get_indicator(),
            name: self.name.clone(),
            current: self.get_current(),
            alarm_min: self.alarm_min,
            alarm_max: self.alarm_max,
            limit_min: self.limit_min,
            limit_max: self.limit_max,
            alarm: self.get_alarm(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hardware_type(&self) -> HardwareType {
        self.hardware_type
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Time of the last committed reading; the Unix epoch before the first.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn alarm_min(&self) -> f64 {
        self.alarm_min
    }

    pub fn alarm_max(&self) -> f64 {
        self.alarm_max
    }

    pub fn limit_min(&self) -> f64 {
        self.limit_min
    }

    pub fn limit_max(&self) -> f64 {
        self.limit_max
    }

    // Binary probes keep their pinned window whatever is set.

    pub fn set_alarm_min(&mut self, value: f64) {
        self.alarm_min = if self.is_binary() { BINARY_ALARM_MIN } else { value };
    }

    pub fn set_alarm_max(&mut self, value: f64) {
        self.alarm_max = if self.is_binary() { BINARY_ALARM_MAX } else { value };
    }

    pub fn set_limit_min(&mut self, value: f64) {
        self.limit_min = if self.is_binary() { BINARY_LIMIT_MIN } else { value };
    }

    pub fn set_limit_max(&mut self, value: f64) {
        self.limit_max = if self.is_binary() { BINARY_LIMIT_MAX } else { value };
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("id", &self.id)
            .field("hardware_type", &self.hardware_type)
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("name", &self.name)
            .field("current", &self.current)
            .field("last_update", &self.last_update)
            .finish_non_exhaustive()
    }
}
