//! Scripted hardware provider.
//!
//! Every queue follows the same rule: each read consumes the front entry,
//! except the last entry, which is repeated forever. So `set_level(pin, true)`
//! means "always high" and `push_levels(pin, &[false, true, false])` plays a
//! pulse once and then stays low.

use super::{DhtModel, DhtSample, HalError, Hardware, I2cBus, InputLine, OutputLine, Pull};
use crate::types::GpioPin;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::{I2c, Operation};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    levels: HashMap<GpioPin, VecDeque<bool>>,
    writes: HashMap<GpioPin, Vec<bool>>,
    claims: HashMap<GpioPin, usize>,
    releases: HashMap<GpioPin, usize>,
    i2c_reads: VecDeque<Vec<u8>>,
    i2c_writes: Vec<(u8, Vec<u8>)>,
    analog: HashMap<u8, VecDeque<f64>>,
    dht: VecDeque<Option<DhtSample>>,
    acquisitions: usize,
    slept: Duration,
}

/// Returns the front entry, keeping the last one in place.
fn next_sticky<T: Copy>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().copied()
    }
}

/// In-memory [`Hardware`] for tests and dry runs.
///
/// Clones share state, so a test keeps one clone for assertions and hands
/// another to the sensor context.
///
/// ```
/// use terrarium_sensors::hal::{Hardware, MockHardware};
///
/// let mock = MockHardware::new();
/// mock.push_analog(0, &[0.5]);
/// assert_eq!(mock.analog(0).unwrap(), 0.5);
/// assert_eq!(mock.acquisitions(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockHardware {
    state: Arc<Mutex<MockState>>,
}

impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds `pin` at a fixed level.
    pub fn set_level(&self, pin: GpioPin, high: bool) {
        self.state.lock().levels.insert(pin, VecDeque::from([high]));
    }

    /// Appends a sequence of levels for `pin`.
    pub fn push_levels(&self, pin: GpioPin, levels: &[bool]) {
        self.state
            .lock()
            .levels
            .entry(pin)
            .or_default()
            .extend(levels.iter().copied());
    }

    /// Levels driven on an output line, in order.
    pub fn writes(&self, pin: GpioPin) -> Vec<bool> {
        self.state.lock().writes.get(&pin).cloned().unwrap_or_default()
    }

    /// How many times `pin` was claimed.
    pub fn claims(&self, pin: GpioPin) -> usize {
        self.state.lock().claims.get(&pin).copied().unwrap_or(0)
    }

    /// How many times `pin` was released.
    pub fn releases(&self, pin: GpioPin) -> usize {
        self.state.lock().releases.get(&pin).copied().unwrap_or(0)
    }

    /// Queues the payload of the next I2C read.
    pub fn push_i2c_read(&self, bytes: &[u8]) {
        self.state.lock().i2c_reads.push_back(bytes.to_vec());
    }

    /// Every I2C write as `(address, bytes)`.
    pub fn i2c_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().i2c_writes.clone()
    }

    /// Appends normalized samples for an ADC channel.
    pub fn push_analog(&self, channel: u8, samples: &[f64]) {
        self.state
            .lock()
            .analog
            .entry(channel)
            .or_default()
            .extend(samples.iter().copied());
    }

    /// Appends DHT read outcomes; `None` is a failed attempt.
    pub fn push_dht(&self, outcomes: &[Option<DhtSample>]) {
        self.state.lock().dht.extend(outcomes.iter().copied());
    }

    /// Number of hardware reads: ADC samples, DHT attempts, I2C bus opens
    /// and input line reads.
    pub fn acquisitions(&self) -> usize {
        self.state.lock().acquisitions
    }

    /// Total time requested from delay sources handed out by this provider.
    pub fn slept(&self) -> Duration {
        self.state.lock().slept
    }
}

impl Hardware for MockHardware {
    fn input(&self, pin: GpioPin, _pull: Pull) -> Result<InputLine, HalError> {
        *self.state.lock().claims.entry(pin).or_default() += 1;
        Ok(Box::new(MockLine {
            pin,
            state: Arc::clone(&self.state),
        }))
    }

    fn output(&self, pin: GpioPin) -> Result<OutputLine, HalError> {
        *self.state.lock().claims.entry(pin).or_default() += 1;
        Ok(Box::new(MockLine {
            pin,
            state: Arc::clone(&self.state),
        }))
    }

    fn i2c(&self, bus: u8) -> Result<I2cBus, HalError> {
        self.state.lock().acquisitions += 1;
        Ok(Box::new(MockI2c {
            bus,
            state: Arc::clone(&self.state),
        }))
    }

    fn analog(&self, channel: u8) -> Result<f64, HalError> {
        let mut state = self.state.lock();
        state.acquisitions += 1;
        state
            .analog
            .get_mut(&channel)
            .and_then(next_sticky)
            .ok_or_else(|| HalError::Unavailable(format!("no samples for channel {}", channel)))
    }

    fn dht(&self, _model: DhtModel, pin: GpioPin) -> Result<DhtSample, HalError> {
        let mut state = self.state.lock();
        state.acquisitions += 1;
        next_sticky(&mut state.dht)
            .flatten()
            .ok_or_else(|| HalError::Unavailable(format!("dht on {} did not answer", pin)))
    }

    fn delay(&self) -> super::Delay {
        Box::new(MockDelay {
            state: Arc::clone(&self.state),
        })
    }
}

struct MockLine {
    pin: GpioPin,
    state: Arc<Mutex<MockState>>,
}

impl MockLine {
    fn level(&self) -> bool {
        let mut state = self.state.lock();
        state.acquisitions += 1;
        state
            .levels
            .get_mut(&self.pin)
            .and_then(next_sticky)
            .unwrap_or(false)
    }

    fn drive(&self, high: bool) {
        self.state
            .lock()
            .writes
            .entry(self.pin)
            .or_default()
            .push(high);
    }
}

impl Drop for MockLine {
    fn drop(&mut self) {
        *self.state.lock().releases.entry(self.pin).or_default() += 1;
    }
}

impl embedded_hal::digital::ErrorType for MockLine {
    type Error = HalError;
}

impl InputPin for MockLine {
    fn is_high(&mut self) -> Result<bool, HalError> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, HalError> {
        Ok(!self.level())
    }
}

impl OutputPin for MockLine {
    fn set_low(&mut self) -> Result<(), HalError> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), HalError> {
        self.drive(true);
        Ok(())
    }
}

struct MockI2c {
    bus: u8,
    state: Arc<Mutex<MockState>>,
}

impl embedded_hal::i2c::ErrorType for MockI2c {
    type Error = HalError;
}

impl I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), HalError> {
        let mut state = self.state.lock();
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => state.i2c_writes.push((address, bytes.to_vec())),
                Operation::Read(buf) => {
                    let response = state.i2c_reads.pop_front().ok_or_else(|| {
                        HalError::Unavailable(format!(
                            "i2c bus {}: no response queued for {:#04x}",
                            self.bus, address
                        ))
                    })?;
                    if response.len() != buf.len() {
                        return Err(HalError::Unavailable(format!(
                            "i2c bus {}: queued {} bytes, read asked for {}",
                            self.bus,
                            response.len(),
                            buf.len()
                        )));
                    }
                    buf.copy_from_slice(&response);
                }
            }
        }
        Ok(())
    }
}

struct MockDelay {
    state: Arc<Mutex<MockState>>,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.lock().slept += Duration::from_nanos(u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.state.lock().slept += Duration::from_micros(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.state.lock().slept += Duration::from_millis(u64::from(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(bcm: u8) -> GpioPin {
        GpioPin::from_bcm(bcm).unwrap()
    }

    #[test]
    fn test_levels_are_sticky() {
        let mock = MockHardware::new();
        mock.push_levels(pin(5), &[true, false]);
        let mut line = mock.input(pin(5), Pull::None).unwrap();
        assert!(line.is_high().unwrap());
        assert!(line.is_low().unwrap());
        assert!(line.is_low().unwrap());
        assert_eq!(mock.acquisitions(), 3);
    }

    #[test]
    fn test_claim_and_release() {
        let mock = MockHardware::new();
        let mut line = mock.output(pin(6)).unwrap();
        line.set_high().unwrap();
        line.set_low().unwrap();
        drop(line);
        assert_eq!(mock.writes(pin(6)), vec![true, false]);
        assert_eq!(mock.claims(pin(6)), 1);
        assert_eq!(mock.releases(pin(6)), 1);
    }

    #[test]
    fn test_i2c_queue() {
        let mock = MockHardware::new();
        mock.push_i2c_read(&[0x60]);
        let mut bus = mock.i2c(1).unwrap();
        let mut id = [0u8; 1];
        bus.write_read(0x76, &[0xD0], &mut id).unwrap();
        assert_eq!(id, [0x60]);
        assert_eq!(mock.i2c_writes(), vec![(0x76, vec![0xD0])]);
        assert!(bus.read(0x76, &mut id).is_err());
    }

    #[test]
    fn test_dht_outcomes() {
        let mock = MockHardware::new();
        let sample = DhtSample {
            humidity: 60.0,
            temperature: 24.0,
        };
        mock.push_dht(&[None, Some(sample)]);
        assert!(mock.dht(DhtModel::Dht22, pin(4)).is_err());
        assert_eq!(mock.dht(DhtModel::Dht22, pin(4)).unwrap(), sample);
        assert_eq!(mock.dht(DhtModel::Dht22, pin(4)).unwrap(), sample);
    }

    #[test]
    fn test_delay_is_recorded() {
        let mock = MockHardware::new();
        let mut delay = mock.delay();
        delay.delay_ms(2100);
        delay.delay_us(10);
        assert_eq!(
            mock.slept(),
            Duration::from_millis(2100) + Duration::from_micros(10)
        );
    }

    #[test]
    fn test_analog_without_samples() {
        let mock = MockHardware::new();
        assert!(mock.analog(3).is_err());
    }
}
