//! HC-SR04 ultrasonic distance sensor.

use super::{invalid_address, parse_pin, round2};
use crate::error::{AcquireError, LoadingError};
use crate::hal::{Delay, Hardware, InputLine, OutputLine, Pull};
use crate::types::{GpioPin, HardwareType};
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Half the speed of sound in cm/s: the echo travels there and back.
const HALF_SPEED_OF_SOUND: f64 = 17150.0;
const SETTLE_MS: u32 = 2000;
const TRIGGER_PULSE_US: u32 = 10;
/// Longest wait for either echo edge. 100 ms is well past the 4 m range.
const ECHO_TIMEOUT: Duration = Duration::from_millis(100);

/// Distance in centimeters for an echo pulse, rounded to two decimals.
///
/// ```
/// # use terrarium_sensors::drivers::distance_from_pulse;
/// # use std::time::Duration;
/// assert_eq!(distance_from_pulse(Duration::from_millis(10)), 171.5);
/// ```
pub fn distance_from_pulse(pulse: Duration) -> f64 {
    round2(pulse.as_secs_f64() * HALF_SPEED_OF_SOUND)
}

pub struct UltrasonicDriver {
    trigger_pin: GpioPin,
    echo_pin: GpioPin,
    trigger: OutputLine,
    echo: InputLine,
    delay: Delay,
}

impl UltrasonicDriver {
    /// Claims both lines; they stay claimed until the driver is dropped.
    pub(super) fn bind(address: &str, hal: &Arc<dyn Hardware>) -> Result<Self, LoadingError> {
        let hardware = HardwareType::HcSr04;
        let (trigger_pin, echo_pin) = match address.split(',').map(str::trim).collect::<Vec<_>>()[..]
        {
            [trigger, echo] => (
                parse_pin(hardware, address, trigger)?,
                parse_pin(hardware, address, echo)?,
            ),
            _ => return Err(invalid_address(hardware, address, "expected trigger,echo")),
        };

        let trigger = hal.output(trigger_pin)?;
        let echo = hal.input(echo_pin, Pull::None)?;
        Ok(Self {
            trigger_pin,
            echo_pin,
            trigger,
            echo,
            delay: hal.delay(),
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        self.trigger.set_low()?;
        self.delay.delay_ms(SETTLE_MS);
        self.trigger.set_high()?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low()?;

        let waiting = Instant::now();
        let mut pulse_start = waiting;
        while self.echo.is_low()? {
            pulse_start = Instant::now();
            if pulse_start.duration_since(waiting) > ECHO_TIMEOUT {
                debug!("No echo on {} after trigger on {}", self.echo_pin, self.trigger_pin);
                return Err(AcquireError::Timeout(ECHO_TIMEOUT));
            }
        }

        let mut pulse_end = Instant::now();
        while self.echo.is_high()? {
            pulse_end = Instant::now();
            if pulse_end.duration_since(pulse_start) > ECHO_TIMEOUT {
                debug!("Echo on {} never dropped", self.echo_pin);
                return Err(AcquireError::Timeout(ECHO_TIMEOUT));
            }
        }

        Ok(distance_from_pulse(pulse_end.duration_since(pulse_start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockHardware;

    fn pin(bcm: u8) -> GpioPin {
        GpioPin::from_bcm(bcm).unwrap()
    }

    fn driver(mock: &MockHardware) -> UltrasonicDriver {
        let hal: Arc<dyn Hardware> = Arc::new(mock.clone());
        UltrasonicDriver::bind("gpio23,gpio24", &hal).ok().unwrap()
    }

    #[test]
    fn test_distance_from_pulse() {
        assert_eq!(distance_from_pulse(Duration::from_millis(10)), 171.5);
        assert_eq!(distance_from_pulse(Duration::ZERO), 0.0);
        assert_eq!(distance_from_pulse(Duration::from_micros(583)), 10.0);
    }

    #[test]
    fn test_trigger_sequence_and_echo() {
        let mock = MockHardware::new();
        mock.push_levels(pin(24), &[false, false, true, true, false]);
        let mut driver = driver(&mock);

        let distance = driver.acquire().unwrap();
        assert!((0.0..5.0).contains(&distance));
        assert_eq!(mock.writes(pin(23)), vec![false, true, false]);
        assert_eq!(
            mock.slept(),
            Duration::from_millis(2000) + Duration::from_micros(10)
        );
    }

    #[test]
    fn test_missing_echo_times_out() {
        let mock = MockHardware::new();
        mock.set_level(pin(24), false);
        let mut driver = driver(&mock);
        let start = Instant::now();
        assert!(matches!(driver.acquire(), Err(AcquireError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_lines_released_on_drop() {
        let mock = MockHardware::new();
        drop(driver(&mock));
        assert_eq!(mock.claims(pin(23)), 1);
        assert_eq!(mock.releases(pin(23)), 1);
        assert_eq!(mock.releases(pin(24)), 1);
    }

    #[test]
    fn test_bind_needs_two_pins() {
        let hal: Arc<dyn Hardware> = Arc::new(MockHardware::new());
        assert!(UltrasonicDriver::bind("gpio23", &hal).is_err());
        assert!(UltrasonicDriver::bind("gpio23,gpio99", &hal).is_err());
    }
}
