//! Legacy 1-Wire controller through owserver.

use super::invalid_address;
use crate::config::SensorConfig;
use crate::error::{AcquireError, LoadingError};
use crate::owfs::OwClient;
use crate::types::{HardwareType, MeasurementKind};

pub struct OwfsDriver {
    client: OwClient,
    device: String,
    property: &'static str,
}

impl OwfsDriver {
    pub(super) fn bind(
        kind: MeasurementKind,
        address: &str,
        config: &SensorConfig,
    ) -> Result<Self, LoadingError> {
        let server = config.owserver_addr().ok_or_else(|| {
            invalid_address(HardwareType::Owfs, address, "owserver port is not configured")
        })?;
        let device = address.trim_matches('/');
        if device.is_empty() {
            return Err(invalid_address(HardwareType::Owfs, address, "empty device id"));
        }
        let property = match kind {
            MeasurementKind::Humidity => "humidity",
            _ => "temperature",
        };

        Ok(Self {
            client: OwClient::new(server, config.remote_timeout),
            device: device.to_string(),
            property,
        })
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        self.client.read_value(&self.device, self.property)
    }
}
