//! Analog pH probe (SKU SEN0161) behind an MCP3008 channel.

use super::{invalid_address, round2};
use crate::error::{AcquireError, LoadingError};
use crate::hal::Hardware;
use crate::types::HardwareType;
use std::sync::Arc;

const SAMPLES: usize = 5;
const SAMPLE_SPACING_MS: u32 = 200;
const MCP3008_CHANNELS: u8 = 8;

/// Converts a normalized ADC sample into a pH value.
///
/// The sample is scaled to millivolts on a 5 V reference and then run through
/// the probe's linear calibration.
pub fn calibrate_ph(sample: f64) -> f64 {
    sample * (5000.0 / 1024.0) * 3.3 + 0.1614
}

/// Average after dropping the lowest and the highest value.
///
/// Returns `None` for fewer than three values.
///
/// ```
/// # use terrarium_sensors::drivers::trimmed_mean;
/// assert_eq!(trimmed_mean(&[9.0, 1.0, 2.0, 3.0, -40.0]), Some(2.0));
/// assert_eq!(trimmed_mean(&[1.0, 2.0]), None);
/// ```
pub fn trimmed_mean(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let inner = &sorted[1..sorted.len() - 1];
    Some(inner.iter().sum::<f64>() / inner.len() as f64)
}

pub struct AnalogDriver {
    hal: Arc<dyn Hardware>,
    channel: u8,
}

impl AnalogDriver {
    pub(super) fn bind(address: &str, hal: &Arc<dyn Hardware>) -> Result<Self, LoadingError> {
        let channel = address
            .parse::<u8>()
            .ok()
            .filter(|c| *c < MCP3008_CHANNELS)
            .ok_or_else(|| {
                invalid_address(HardwareType::SkuSen0161, address, "expected an ADC channel 0-7")
            })?;
        Ok(Self {
            hal: Arc::clone(hal),
            channel,
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        let mut delay = self.hal.delay();
        let mut values = Vec::with_capacity(SAMPLES);
        for _ in 0..SAMPLES {
            values.push(calibrate_ph(self.hal.analog(self.channel)?));
            delay.delay_ms(SAMPLE_SPACING_MS);
        }
        let mean = trimmed_mean(&values)
            .ok_or_else(|| AcquireError::Absent(format!("ADC channel {}", self.channel)))?;
        Ok(round2(mean))
    }
}
