//! Binary soil moisture probe (YL-69 / YT-xx comparator output).
//!
//! The comparator pulls the signal line low when the soil is dry. Probes that
//! corrode when powered all the time can be wired to a second GPIO that
//! switches their supply: the address is then `signal,power` and the probe is
//! only powered for the duration of one read.

use super::{invalid_address, parse_pin};
use crate::error::{AcquireError, LoadingError};
use crate::hal::{Delay, Hardware, InputLine, OutputLine, Pull};
use crate::types::{GpioPin, HardwareType};
use log::{debug, warn};
use std::sync::Arc;

const POWER_UP_MS: u32 = 500;

pub const DRY: f64 = 1.0;
pub const WET: f64 = 0.0;

pub struct MoistureDriver {
    signal_pin: GpioPin,
    signal: InputLine,
    power: Option<(GpioPin, OutputLine)>,
    delay: Delay,
}

impl MoistureDriver {
    pub(super) fn bind(address: &str, hal: &Arc<dyn Hardware>) -> Result<Self, LoadingError> {
        let hardware = HardwareType::YtxxDigital;
        let pins: Vec<&str> = address.split(',').map(str::trim).collect();
        let (signal_pin, power_pin) = match pins[..] {
            [signal] => (parse_pin(hardware, address, signal)?, None),
            [signal, power] => (
                parse_pin(hardware, address, signal)?,
                Some(parse_pin(hardware, address, power)?),
            ),
            _ => return Err(invalid_address(hardware, address, "expected signal[,power]")),
        };
        if power_pin == Some(signal_pin) {
            return Err(invalid_address(hardware, address, "signal and power share a pin"));
        }

        let signal = hal.input(signal_pin, Pull::Up)?;
        let power = match power_pin {
            Some(pin) => {
                debug!("Enabling power control on {} for probe on {}", pin, signal_pin);
                let mut line = hal.output(pin)?;
                line.set_low()?;
                Some((pin, line))
            }
            None => None,
        };

        Ok(Self {
            signal_pin,
            signal,
            power,
            delay: hal.delay(),
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        if let Some((pin, line)) = self.power.as_mut() {
            debug!("Powering up probe on {} via {}", self.signal_pin, pin);
            line.set_high()?;
            self.delay.delay_ms(POWER_UP_MS);
        }

        let dry = self.signal.is_low();

        if let Some((pin, line)) = self.power.as_mut() {
            if let Err(e) = line.set_low() {
                warn!("Could not power down probe via {}: {}", pin, e);
            }
        }

        Ok(if dry? { DRY } else { WET })
    }
}

impl Drop for MoistureDriver {
    fn drop(&mut self) {
        if let Some((pin, line)) = self.power.as_mut() {
            debug!("Closing power control pin {}", pin);
            if let Err(e) = line.set_low() {
                warn!("Could not power down probe via {}: {}", pin, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockHardware;
    use std::time::Duration;

    fn pin(bcm: u8) -> GpioPin {
        GpioPin::from_bcm(bcm).unwrap()
    }

    fn driver(mock: &MockHardware, address: &str) -> MoistureDriver {
        let hal: Arc<dyn Hardware> = Arc::new(mock.clone());
        MoistureDriver::bind(address, &hal).ok().unwrap()
    }

    #[test]
    fn test_high_is_wet_low_is_dry() {
        let mock = MockHardware::new();
        let mut probe = driver(&mock, "gpio17");

        mock.set_level(pin(17), true);
        assert_eq!(probe.acquire().unwrap(), WET);

        mock.set_level(pin(17), false);
        assert_eq!(probe.acquire().unwrap(), DRY);

        assert_eq!(mock.slept(), Duration::ZERO);
    }

    #[test]
    fn test_power_gating() {
        let mock = MockHardware::new();
        mock.set_level(pin(17), true);
        let mut probe = driver(&mock, "gpio17, gpio27");

        assert_eq!(probe.acquire().unwrap(), WET);
        assert_eq!(mock.writes(pin(27)), vec![false, true, false]);
        assert_eq!(mock.slept(), Duration::from_millis(500));

        drop(probe);
        assert_eq!(mock.writes(pin(27)), vec![false, true, false, false]);
        assert_eq!(mock.releases(pin(27)), 1);
        assert_eq!(mock.releases(pin(17)), 1);
    }

    #[test]
    fn test_bind_errors() {
        let hal: Arc<dyn Hardware> = Arc::new(MockHardware::new());
        assert!(MoistureDriver::bind("gpio17,gpio17", &hal).is_err());
        assert!(MoistureDriver::bind("gpio17,gpio18,gpio19", &hal).is_err());
        assert!(MoistureDriver::bind("", &hal).is_err());
    }
}
