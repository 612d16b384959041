//! Digital I2C humidity and temperature sensors.
//!
//! SHT2x, HTU21D and Si7021 speak the same command set: a "no hold master"
//! measurement command, a conversion wait, then a three byte answer whose
//! last byte is a CRC-8 over the first two. The BME280 is different enough to
//! get its own path: factory calibration is read from the chip on every
//! measurement and the raw values are compensated with Bosch's floating point
//! formulas.
//!
//! The bus is opened at the start of [`I2cDriver::acquire`] and closed when it
//! returns. Nothing is held between reads.

use super::invalid_address;
use crate::error::{AcquireError, LoadingError};
use crate::hal::{Delay, Hardware, I2cBus};
use crate::types::{HardwareType, MeasurementKind};
use std::fmt;
use std::sync::Arc;

const SHT_TRIGGER_TEMPERATURE: u8 = 0xF3;
const SHT_TRIGGER_HUMIDITY: u8 = 0xF5;
const SHT_TEMPERATURE_WAIT_MS: u32 = 85;
const SHT_HUMIDITY_WAIT_MS: u32 = 29;
const SHT_STATUS_BITS: u16 = 0x0003;

const BME280_CHIP_ID: u8 = 0x60;
const BME280_REG_ID: u8 = 0xD0;
const BME280_REG_CALIB1: u8 = 0x88;
const BME280_REG_CALIB2: u8 = 0xE1;
const BME280_REG_CTRL_HUM: u8 = 0xF2;
const BME280_REG_CTRL_MEAS: u8 = 0xF4;
const BME280_REG_DATA: u8 = 0xF7;
/// Humidity oversampling x1.
const BME280_CTRL_HUM: u8 = 0x01;
/// Temperature and pressure oversampling x1, forced mode.
const BME280_CTRL_MEAS: u8 = 0x25;
const BME280_MEASURE_MS: u32 = 10;

/// Bus number and 7-bit device address.
///
/// Written as `bus,address` with the address in hex (`1,0x40` or `1,40`).
/// A lone address means bus 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cAddress {
    pub bus: u8,
    pub address: u8,
}

impl I2cAddress {
    pub fn parse(hardware: HardwareType, raw: &str) -> Result<Self, LoadingError> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        let (bus, address) = match parts.as_slice() {
            [address] => (1, *address),
            [bus, address] => {
                let bus = bus
                    .parse::<u8>()
                    .map_err(|_| invalid_address(hardware, raw, "bus must be a number"))?;
                (bus, *address)
            }
            _ => return Err(invalid_address(hardware, raw, "expected bus,address")),
        };

        let hex = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .unwrap_or(address);
        let address = u8::from_str_radix(hex, 16)
            .ok()
            .filter(|a| *a <= 0x7F)
            .ok_or_else(|| invalid_address(hardware, raw, "address must be a 7-bit hex value"))?;

        Ok(Self { bus, address })
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{:#04x}", self.bus, self.address)
    }
}

/// Protocol family of an I2C sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cChip {
    /// SHT2x, HTU21D, Si7021
    Sht,
    Bme280,
}

impl I2cChip {
    pub fn from_hardware(hardware: HardwareType) -> Option<Self> {
        match hardware {
            HardwareType::Sht2x | HardwareType::Htu21d | HardwareType::Si7021 => Some(I2cChip::Sht),
            HardwareType::Bme280 => Some(I2cChip::Bme280),
            _ => None,
        }
    }
}

/// CRC-8 with polynomial 0x31 and initial value 0, as used by the SHT family.
///
/// ```
/// # use terrarium_sensors::drivers::crc8;
/// assert_eq!(crc8(&[0x68, 0x3A]), 0x7C);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn sht_temperature(raw: u16) -> f64 {
    -46.85 + 175.72 * f64::from(raw & !SHT_STATUS_BITS) / 65536.0
}

fn sht_humidity(raw: u16) -> f64 {
    -6.0 + 125.0 * f64::from(raw & !SHT_STATUS_BITS) / 65536.0
}

/// BME280 factory trimming values for temperature and humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bme280Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Bme280Calibration {
    /// Decodes the `0x88..=0xA1` and `0xE1..=0xE7` register blocks.
    pub fn from_registers(calib1: &[u8; 26], calib2: &[u8; 7]) -> Self {
        let le_u16 = |b: &[u8], i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let le_i16 = |b: &[u8], i: usize| i16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            t1: le_u16(calib1, 0),
            t2: le_i16(calib1, 2),
            t3: le_i16(calib1, 4),
            h1: calib1[25],
            h2: le_i16(calib2, 0),
            h3: calib2[2],
            h4: (i16::from(calib2[3] as i8) << 4) | i16::from(calib2[4] & 0x0F),
            h5: (i16::from(calib2[5] as i8) << 4) | i16::from(calib2[4] >> 4),
            h6: calib2[6] as i8,
        }
    }

    /// Returns `(celsius, t_fine)`.
    pub fn compensate_temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let delta = adc_t / 131072.0 - t1 / 8192.0;
        let var2 = delta * delta * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Relative humidity in percent, clamped to `0..=100`.
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let h = t_fine - 76800.0;
        let h = (f64::from(adc_h)
            - (f64::from(self.h4) * 64.0 + f64::from(self.h5) / 16384.0 * h))
            * (f64::from(self.h2) / 65536.0
                * (1.0
                    + f64::from(self.h6) / 67108864.0
                        * h
                        * (1.0 + f64::from(self.h3) / 67108864.0 * h)));
        let h = h * (1.0 - f64::from(self.h1) * h / 524288.0);
        h.clamp(0.0, 100.0)
    }
}

pub struct I2cDriver {
    hal: Arc<dyn Hardware>,
    chip: I2cChip,
    at: I2cAddress,
    kind: MeasurementKind,
}

impl I2cDriver {
    pub(super) fn bind(
        hardware: HardwareType,
        kind: MeasurementKind,
        address: &str,
        hal: &Arc<dyn Hardware>,
    ) -> Result<Self, LoadingError> {
        let chip = I2cChip::from_hardware(hardware)
            .ok_or(LoadingError::UnsupportedMeasurement { hardware, kind })?;
        Ok(Self {
            hal: Arc::clone(hal),
            chip,
            at: I2cAddress::parse(hardware, address)?,
            kind,
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        let mut bus = self.hal.i2c(self.at.bus)?;
        let mut delay = self.hal.delay();
        match self.chip {
            I2cChip::Sht => self.read_sht(&mut bus, &mut delay),
            I2cChip::Bme280 => self.read_bme280(&mut bus, &mut delay),
        }
    }

    fn read_sht(&self, bus: &mut I2cBus, delay: &mut Delay) -> Result<f64, AcquireError> {
        let (command, wait) = match self.kind {
            MeasurementKind::Humidity => (SHT_TRIGGER_HUMIDITY, SHT_HUMIDITY_WAIT_MS),
            _ => (SHT_TRIGGER_TEMPERATURE, SHT_TEMPERATURE_WAIT_MS),
        };
        bus.write(self.at.address, &[command])?;
        delay.delay_ms(wait);

        let mut answer = [0u8; 3];
        bus.read(self.at.address, &mut answer)?;
        let expected = crc8(&answer[..2]);
        if expected != answer[2] {
            return Err(AcquireError::Checksum {
                expected,
                actual: answer[2],
            });
        }

        let raw = u16::from_be_bytes([answer[0], answer[1]]);
        Ok(match self.kind {
            MeasurementKind::Humidity => sht_humidity(raw),
            _ => sht_temperature(raw),
        })
    }

    fn read_bme280(&self, bus: &mut I2cBus, delay: &mut Delay) -> Result<f64, AcquireError> {
        let address = self.at.address;

        let mut id = [0u8; 1];
        bus.write_read(address, &[BME280_REG_ID], &mut id)?;
        if id[0] != BME280_CHIP_ID {
            return Err(AcquireError::Absent(format!(
                "no BME280 at {} (chip id {:#04x})",
                self.at, id[0]
            )));
        }

        let mut calib1 = [0u8; 26];
        bus.write_read(address, &[BME280_REG_CALIB1], &mut calib1)?;
        let mut calib2 = [0u8; 7];
        bus.write_read(address, &[BME280_REG_CALIB2], &mut calib2)?;
        let calibration = Bme280Calibration::from_registers(&calib1, &calib2);

        bus.write(address, &[BME280_REG_CTRL_HUM, BME280_CTRL_HUM])?;
        bus.write(address, &[BME280_REG_CTRL_MEAS, BME280_CTRL_MEAS])?;
        delay.delay_ms(BME280_MEASURE_MS);

        let mut data = [0u8; 8];
        bus.write_read(address, &[BME280_REG_DATA], &mut data)?;
        let adc_t = (i32::from(data[3]) << 12) | (i32::from(data[4]) << 4) | (i32::from(data[5]) >> 4);
        let adc_h = (i32::from(data[6]) << 8) | i32::from(data[7]);

        let (temperature, t_fine) = calibration.compensate_temperature(adc_t);
        Ok(match self.kind {
            MeasurementKind::Humidity => calibration.compensate_humidity(adc_h, t_fine),
            _ => temperature,
        })
    }
}
