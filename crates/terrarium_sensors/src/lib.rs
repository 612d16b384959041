#![doc = include_str!("../README.md")]
#![allow(rustdoc::bare_urls)]
//! # Terrarium Sensors
//!
//! Sensor abstraction and polling engine for enclosed habitat monitoring.
//!
//! ## Overview
//!
//! Every probe in an enclosure, whether it sits on the 1-Wire bus, an I2C bus,
//! a GPIO line, an ADC channel, a web service or behind a shell script, is
//! presented as a [`Sensor`]: a stable id, a name, a current value in native
//! units, alarm and validity windows, and a uniform [`Sensor::update`] cycle
//! that rate-limits hardware access and survives hardware failures.
//!
//! ## Features
//!
//! - **One lifecycle for all probes**: staleness gating, range validation and
//!   failure containment live in [`Sensor`], drivers only read hardware
//! - **Fourteen hardware families**: see [`HardwareType`]
//! - **Bus discovery**: [`scan()`] finds every temperature/humidity probe on
//!   owserver and the kernel 1-Wire bus
//! - **Swappable hardware**: drivers talk to a [`Hardware`] provider, so every
//!   driver runs against [`MockHardware`] in tests
//! - **Display units**: metric or imperial through an indicator callback,
//!   values are always stored natively
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use terrarium_sensors::{units, Sensor, SensorConfig, SensorContext, SensorDefinition};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = SensorContext::linux(SensorConfig::from_env(), units::metric())?;
//!     let mut sensor = Sensor::new(
//!         SensorDefinition::new("sht2x", "humidity", "1,0x40").with_name("Cool side"),
//!         &ctx,
//!     )?;
//!
//!     if sensor.update(false) {
//!         println!("{}", serde_json::to_string(&sensor.get_data())?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Discovery
//!
//! ```rust,no_run
//! use terrarium_sensors::{scan, units, SensorConfig, SensorContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = SensorContext::linux(SensorConfig::default(), units::imperial())?;
//! let report = scan(4304, &ctx);
//! for sensor in &report.sensors {
//!     println!("{} {}{}", sensor.name(), sensor.get_current(), sensor.get_indicator());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod owfs;
pub mod scan;
pub mod script;
pub mod sensor;
pub mod types;
pub mod units;

// Re-exports
pub use config::{ConfigError, SensorConfig};
pub use error::{AcquireError, Error, LoadingError, Result};
pub use hal::{HalError, Hardware, MockHardware};
#[cfg(unix)]
pub use hal::LinuxHardware;
pub use scan::{scan, ScanReport};
pub use sensor::{sensor_id, Sensor, SensorContext, SensorDefinition, SensorState};
pub use types::{GpioPin, HardwareType, MeasurementKind, SensorData};
pub use units::IndicatorFn;

/// Version information for the crate.
///
/// # Examples
///
/// ```
/// # use terrarium_sensors::VERSION;
/// println!("terrarium-sensors version: {}", VERSION);
/// ```
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default minimum age, in seconds, of a reading before the hardware is read
/// again.
pub const UPDATE_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the update timeout, in seconds.
///
/// # Examples
///
/// ```bash
/// export TERRARIUM_UPDATE_TIMEOUT_SECS=60
/// ```
pub const ENV_UPDATE_TIMEOUT: &str = "TERRARIUM_UPDATE_TIMEOUT_SECS";

/// Environment variable enabling the owserver controller on a TCP port.
///
/// # Examples
///
/// ```bash
/// export TERRARIUM_OWFS_PORT=4304
/// ```
pub const ENV_OWFS_PORT: &str = "TERRARIUM_OWFS_PORT";

/// Environment variable naming the host running owserver.
pub const ENV_OWSERVER_HOST: &str = "TERRARIUM_OWSERVER_HOST";

/// Environment variable overriding the kernel 1-Wire device directory.
pub const ENV_W1_PATH: &str = "TERRARIUM_W1_PATH";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_update_timeout() {
        assert_eq!(
            SensorConfig::default().update_timeout.as_secs(),
            UPDATE_TIMEOUT_SECS
        );
    }
}
