//! Hardware access layer.
//!
//! Drivers never talk to sysfs or device nodes directly. They ask a
//! [`Hardware`] provider for `embedded-hal` 1.0 handles (GPIO lines, an I2C
//! bus, a delay source) plus two higher level reads that the kernel already
//! implements for us (an ADC channel and a DHT sensor). Every handle is an
//! owned value: dropping it releases the line or closes the bus.
//!
//! Two providers ship with the crate:
//! - [`LinuxHardware`]: sysfs GPIO, `/dev/i2c-N`, IIO (`mcp3008`, `dht11`)
//! - [`MockHardware`]: scripted levels and responses, for tests and dry runs

#[cfg(unix)]
mod linux;
mod mock;

#[cfg(unix)]
pub use linux::LinuxHardware;
pub use mock::MockHardware;

use crate::types::{GpioPin, HardwareType};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a hardware provider.
#[derive(Debug, Error)]
pub enum HalError {
    /// A GPIO line could not be claimed, read or driven.
    #[error("{pin}: {source}")]
    Gpio {
        pin: GpioPin,
        source: std::io::Error,
    },
    /// An I2C bus could not be opened or a transfer failed.
    #[error("i2c bus {bus}: {source}")]
    I2c { bus: u8, source: std::io::Error },
    /// A kernel device attribute could not be read.
    #[error("{}: {reason}", path.display())]
    Device { path: PathBuf, reason: String },
    /// The requested device does not exist on this system.
    #[error("{0}")]
    Unavailable(String),
}

impl embedded_hal::digital::Error for HalError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl embedded_hal::i2c::Error for HalError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        embedded_hal::i2c::ErrorKind::Other
    }
}

/// An owned GPIO input line. Dropping it releases the line.
pub type InputLine = Box<dyn InputPin<Error = HalError> + Send>;

/// An owned GPIO output line. Dropping it releases the line.
pub type OutputLine = Box<dyn OutputPin<Error = HalError> + Send>;

/// An open I2C bus. Dropping it closes the bus.
pub type I2cBus = Box<dyn I2c<Error = HalError> + Send>;

/// A blocking delay source.
pub type Delay = Box<dyn DelayNs + Send>;

/// Input bias for a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// DHT protocol flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtModel {
    Dht11,
    /// DHT22 and AM2302 share this protocol
    Dht22,
}

impl DhtModel {
    pub fn from_hardware(hardware: HardwareType) -> Option<Self> {
        match hardware {
            HardwareType::Dht11 => Some(DhtModel::Dht11),
            HardwareType::Dht22 | HardwareType::Am2302 => Some(DhtModel::Dht22),
            _ => None,
        }
    }
}

/// One successful DHT read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DhtSample {
    /// Relative humidity (%)
    pub humidity: f64,
    /// Degrees Celsius
    pub temperature: f64,
}

/// Provider of hardware handles.
///
/// Implementations must be shareable between sensors; every handle they hand
/// out is exclusively owned by the driver that asked for it.
pub trait Hardware: Send + Sync {
    /// Claims a GPIO line as input.
    fn input(&self, pin: GpioPin, pull: Pull) -> Result<InputLine, HalError>;

    /// Claims a GPIO line as output.
    fn output(&self, pin: GpioPin) -> Result<OutputLine, HalError>;

    /// Opens an I2C bus.
    fn i2c(&self, bus: u8) -> Result<I2cBus, HalError>;

    /// Samples an ADC channel once, normalized to `0.0..=1.0`.
    fn analog(&self, channel: u8) -> Result<f64, HalError>;

    /// Performs one DHT read attempt on the given data pin.
    fn dht(&self, model: DhtModel, pin: GpioPin) -> Result<DhtSample, HalError>;

    /// Returns a delay source.
    fn delay(&self) -> Delay {
        Box::new(StdDelay)
    }
}

/// [`DelayNs`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dht_model_from_hardware() {
        assert_eq!(
            DhtModel::from_hardware(HardwareType::Dht11),
            Some(DhtModel::Dht11)
        );
        assert_eq!(
            DhtModel::from_hardware(HardwareType::Am2302),
            Some(DhtModel::Dht22)
        );
        assert_eq!(DhtModel::from_hardware(HardwareType::W1), None);
    }

    #[test]
    fn test_std_delay_sleeps() {
        let start = std::time::Instant::now();
        StdDelay.delay_ms(5);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_hal_error_display() {
        let pin = GpioPin::from_bcm(17).unwrap();
        let err = HalError::Gpio {
            pin,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such line"),
        };
        assert_eq!(err.to_string(), "gpio17: no such line");
    }
}
