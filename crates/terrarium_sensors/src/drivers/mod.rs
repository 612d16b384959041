//! Hardware driver variants.
//!
//! A [`Driver`] is chosen once, when a sensor is bound, from its hardware
//! family. After that the sensor only ever calls [`Driver::acquire`], which
//! either yields one raw sample in the native unit or fails. Failures are
//! reported as [`AcquireError`] so they can be logged, but they never reach
//! the callers of [`Sensor::update`](crate::Sensor::update).
//!
//! | Family | Driver | Address |
//! |--------|--------|---------|
//! | `w1` | [`W1Driver`] | slave directory, `28-0000075c0a6b` |
//! | `owfs` | [`OwfsDriver`] | device id, `10.67C6697351FF` |
//! | `dht11`, `dht22`, `am2302` | [`DhtDriver`] | data pin |
//! | `sht2x`, `htu21d`, `si7021`, `bme280` | [`I2cDriver`] | `bus,address` |
//! | `hc-sr04` | [`UltrasonicDriver`] | `trigger,echo` |
//! | `sku-sen0161` | [`AnalogDriver`] | ADC channel |
//! | `ytxx-digital` | [`MoistureDriver`] | `signal[,power]` |
//! | `remote` | [`RemoteDriver`] | URL, optional `#json/path` |
//! | `script` | [`ScriptDriver`] | `executable[,arg...]` |

mod analog;
mod dht;
mod i2c;
mod moisture;
mod owfs;
mod remote;
mod script;
mod ultrasonic;
mod w1;

pub use analog::{calibrate_ph, trimmed_mean, AnalogDriver};
pub use dht::DhtDriver;
pub use i2c::{crc8, Bme280Calibration, I2cAddress, I2cChip, I2cDriver};
pub use moisture::MoistureDriver;
pub use owfs::OwfsDriver;
pub use remote::{RemoteDriver, RemoteSource};
pub use script::ScriptDriver;
pub use ultrasonic::{distance_from_pulse, UltrasonicDriver};
pub use w1::{parse_w1_slave, W1Driver};

use crate::config::SensorConfig;
use crate::error::{AcquireError, LoadingError};
use crate::hal::Hardware;
use crate::types::{GpioPin, HardwareType, MeasurementKind};
use std::sync::Arc;

/// A bound hardware driver.
pub enum Driver {
    W1(W1Driver),
    Owfs(OwfsDriver),
    Dht(DhtDriver),
    I2c(I2cDriver),
    Ultrasonic(UltrasonicDriver),
    Analog(AnalogDriver),
    Moisture(MoistureDriver),
    Remote(RemoteDriver),
    Script(ScriptDriver),
}

impl Driver {
    /// Parses `address` for `hardware` and claims whatever the driver keeps
    /// open between reads.
    ///
    /// # Errors
    ///
    /// [`LoadingError::UnsupportedMeasurement`] if the family cannot measure
    /// `kind`, [`LoadingError::InvalidAddress`] for an unusable address, and
    /// the script and hardware errors of the individual drivers.
    pub fn bind(
        hardware: HardwareType,
        kind: MeasurementKind,
        address: &str,
        hal: &Arc<dyn Hardware>,
        config: &SensorConfig,
    ) -> Result<Self, LoadingError> {
        if !hardware.supports(kind) {
            return Err(LoadingError::UnsupportedMeasurement { hardware, kind });
        }

        let address = address.trim();
        let driver = match hardware {
            HardwareType::W1 => Driver::W1(W1Driver::bind(address, config)?),
            HardwareType::Owfs => Driver::Owfs(OwfsDriver::bind(kind, address, config)?),
            HardwareType::Dht11 | HardwareType::Dht22 | HardwareType::Am2302 => {
                Driver::Dht(DhtDriver::bind(hardware, kind, address, hal)?)
            }
            HardwareType::Sht2x
            | HardwareType::Htu21d
            | HardwareType::Si7021
            | HardwareType::Bme280 => Driver::I2c(I2cDriver::bind(hardware, kind, address, hal)?),
            HardwareType::HcSr04 => Driver::Ultrasonic(UltrasonicDriver::bind(address, hal)?),
            HardwareType::SkuSen0161 => Driver::Analog(AnalogDriver::bind(address, hal)?),
            HardwareType::YtxxDigital => Driver::Moisture(MoistureDriver::bind(address, hal)?),
            HardwareType::Remote => Driver::Remote(RemoteDriver::bind(address, config)),
            HardwareType::Script => Driver::Script(ScriptDriver::bind(address, config)?),
        };
        Ok(driver)
    }

    /// Reads one raw sample in the native unit.
    pub fn acquire(&mut self) -> Result<f64, AcquireError> {
        match self {
            Driver::W1(d) => d.acquire(),
            Driver::Owfs(d) => d.acquire(),
            Driver::Dht(d) => d.acquire(),
            Driver::I2c(d) => d.acquire(),
            Driver::Ultrasonic(d) => d.acquire(),
            Driver::Analog(d) => d.acquire(),
            Driver::Moisture(d) => d.acquire(),
            Driver::Remote(d) => d.acquire(),
            Driver::Script(d) => d.acquire(),
        }
    }
}

/// Rounds to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn invalid_address(hardware: HardwareType, address: &str, reason: impl Into<String>) -> LoadingError {
    LoadingError::InvalidAddress {
        hardware,
        address: address.to_string(),
        reason: reason.into(),
    }
}

/// Parses a single pin, reporting failures against the whole address.
fn parse_pin(hardware: HardwareType, address: &str, pin: &str) -> Result<GpioPin, LoadingError> {
    pin.parse::<GpioPin>()
        .map_err(|reason| invalid_address(hardware, address, reason))
}
