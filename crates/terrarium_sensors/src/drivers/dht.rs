//! DHT11 / DHT22 / AM2302 single-wire sensors.

use super::parse_pin;
use crate::error::{AcquireError, LoadingError};
use crate::hal::{DhtModel, HalError, Hardware};
use crate::types::{GpioPin, HardwareType, MeasurementKind};
use log::debug;
use std::sync::Arc;

/// Quiet time before every read. The sensors refuse to answer more often.
const SETTLE_MS: u32 = 2100;
const MAX_ATTEMPTS: u32 = 5;
const RETRY_DELAY_MS: u32 = 2000;

pub struct DhtDriver {
    hal: Arc<dyn Hardware>,
    model: DhtModel,
    pin: GpioPin,
    kind: MeasurementKind,
}

impl DhtDriver {
    pub(super) fn bind(
        hardware: HardwareType,
        kind: MeasurementKind,
        address: &str,
        hal: &Arc<dyn Hardware>,
    ) -> Result<Self, LoadingError> {
        let model = DhtModel::from_hardware(hardware).ok_or_else(|| {
            LoadingError::UnsupportedMeasurement { hardware, kind }
        })?;
        Ok(Self {
            hal: Arc::clone(hal),
            model,
            pin: parse_pin(hardware, address, address)?,
            kind,
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        let mut delay = self.hal.delay();
        delay.delay_ms(SETTLE_MS);

        let mut last_error = HalError::Unavailable(format!("dht on {} not read", self.pin));
        for attempt in 1..=MAX_ATTEMPTS {
            match self.hal.dht(self.model, self.pin) {
                Ok(sample) => {
                    return Ok(match self.kind {
                        MeasurementKind::Humidity => sample.humidity,
                        _ => sample.temperature,
                    });
                }
                Err(e) => {
                    debug!("DHT read {}/{} on {} failed: {}", attempt, MAX_ATTEMPTS, self.pin, e);
                    last_error = e;
                    if attempt < MAX_ATTEMPTS {
                        delay.delay_ms(RETRY_DELAY_MS);
                    }
                }
            }
        }
        Err(last_error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{DhtSample, MockHardware};
    use std::time::Duration;

    const SAMPLE: DhtSample = DhtSample {
        humidity: 55.5,
        temperature: 26.3,
    };

    fn driver(mock: &MockHardware, kind: MeasurementKind) -> DhtDriver {
        let hal: Arc<dyn Hardware> = Arc::new(mock.clone());
        DhtDriver::bind(HardwareType::Am2302, kind, "gpio4", &hal).unwrap()
    }

    #[test]
    fn test_keeps_requested_half() {
        let mock = MockHardware::new();
        mock.push_dht(&[Some(SAMPLE)]);
        assert_eq!(driver(&mock, MeasurementKind::Temperature).acquire().unwrap(), 26.3);
        assert_eq!(driver(&mock, MeasurementKind::Humidity).acquire().unwrap(), 55.5);
    }

    #[test]
    fn test_retries_until_success() {
        let mock = MockHardware::new();
        mock.push_dht(&[None, None, Some(SAMPLE)]);
        let value = driver(&mock, MeasurementKind::Humidity).acquire().unwrap();
        assert_eq!(value, 55.5);
        assert_eq!(mock.acquisitions(), 3);
        assert_eq!(mock.slept(), Duration::from_millis(2100 + 2 * 2000));
    }

    #[test]
    fn test_gives_up_after_five_attempts() {
        let mock = MockHardware::new();
        mock.push_dht(&[None]);
        let result = driver(&mock, MeasurementKind::Temperature).acquire();
        assert!(matches!(result, Err(AcquireError::Hal(_))));
        assert_eq!(mock.acquisitions(), 5);
        assert_eq!(mock.slept(), Duration::from_millis(2100 + 4 * 2000));
    }

    #[test]
    fn test_bind_parses_physical_pin() {
        let mock = MockHardware::new();
        let hal: Arc<dyn Hardware> = Arc::new(mock);
        let driver = DhtDriver::bind(HardwareType::Dht11, MeasurementKind::Humidity, "7", &hal)
            .unwrap();
        assert_eq!(driver.pin.bcm(), 4);
        assert!(DhtDriver::bind(HardwareType::Dht11, MeasurementKind::Humidity, "gpio99", &hal)
            .is_err());
    }
}
