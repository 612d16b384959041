//! Kernel 1-Wire bus files.

use super::invalid_address;
use crate::config::SensorConfig;
use crate::error::{AcquireError, LoadingError};
use crate::types::{HardwareType, MeasurementKind};
use log::error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

static W1_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<type>t|f)=(?P<value>[0-9\-]+)").expect("w1 value pattern is valid")
});

/// Extracts the measurement from a `w1_slave` file.
///
/// Returns the kind announced by the type flag (`t` is temperature, anything
/// else humidity) and the value divided by 1000.
///
/// ```
/// # use terrarium_sensors::drivers::parse_w1_slave;
/// # use terrarium_sensors::MeasurementKind;
/// let data = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
/// assert_eq!(parse_w1_slave(data), Some((MeasurementKind::Temperature, 23.125)));
/// ```
pub fn parse_w1_slave(data: &str) -> Option<(MeasurementKind, f64)> {
    let captures = W1_VALUE.captures(data)?;
    let kind = if &captures["type"] == "t" {
        MeasurementKind::Temperature
    } else {
        MeasurementKind::Humidity
    };
    let value = captures["value"].parse::<f64>().ok()?;
    Some((kind, value / 1000.0))
}

pub struct W1Driver {
    slave: PathBuf,
}

impl W1Driver {
    pub(super) fn bind(address: &str, config: &SensorConfig) -> Result<Self, LoadingError> {
        if address.is_empty() || address.contains('/') || address.contains("..") {
            return Err(invalid_address(
                HardwareType::W1,
                address,
                "expected a 1-Wire slave directory name",
            ));
        }
        Ok(Self {
            slave: config.w1_base_path.join(address).join("w1_slave"),
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        if !self.slave.is_file() {
            error!("1-Wire sensor at {} is not available", self.slave.display());
            return Err(AcquireError::Absent(self.slave.display().to_string()));
        }

        let data = fs::read_to_string(&self.slave)?;
        match parse_w1_slave(&data) {
            Some((_, value)) => Ok(value),
            None => {
                error!(
                    "Error reading 1-Wire data at {}. Current data: {}",
                    self.slave.display(),
                    data.trim()
                );
                Err(AcquireError::Parse(data.trim().to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(address: &str, content: &str) -> (TempDir, SensorConfig) {
        let dir = TempDir::new().unwrap();
        let slave = dir.path().join(address);
        fs::create_dir_all(&slave).unwrap();
        fs::write(slave.join("w1_slave"), content).unwrap();
        let config = SensorConfig {
            w1_base_path: dir.path().to_path_buf(),
            ..SensorConfig::test_mode()
        };
        (dir, config)
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(
            parse_w1_slave("t=23500"),
            Some((MeasurementKind::Temperature, 23.5))
        );
        assert_eq!(
            parse_w1_slave("crc=aa YES T=-1250"),
            Some((MeasurementKind::Humidity, -1.25))
        );
        assert_eq!(
            parse_w1_slave("f=61000"),
            Some((MeasurementKind::Humidity, 61.0))
        );
        assert_eq!(parse_w1_slave("crc=00 NO"), None);
        assert_eq!(parse_w1_slave("t=-"), None);
    }

    #[test]
    fn test_acquire_reads_slave_file() {
        let (_dir, config) = tree("28-0000075c0a6b", "4b 46 7f ff : crc=57 YES\n4b 46 t=23500\n");
        let mut driver = W1Driver::bind("28-0000075c0a6b", &config).unwrap();
        assert_eq!(driver.acquire().unwrap(), 23.5);
    }

    #[test]
    fn test_acquire_missing_slave() {
        let (_dir, config) = tree("28-0000075c0a6b", "t=23500");
        let mut driver = W1Driver::bind("28-000000000000", &config).unwrap();
        assert!(matches!(driver.acquire(), Err(AcquireError::Absent(_))));
    }

    #[test]
    fn test_acquire_garbage() {
        let (_dir, config) = tree("28-0000075c0a6b", "crc=00 NO");
        let mut driver = W1Driver::bind("28-0000075c0a6b", &config).unwrap();
        assert!(matches!(driver.acquire(), Err(AcquireError::Parse(_))));
    }

    #[test]
    fn test_bind_rejects_paths() {
        let config = SensorConfig::test_mode();
        assert!(W1Driver::bind("../etc", &config).is_err());
        assert!(W1Driver::bind("", &config).is_err());
    }
}
