//! Configuration for the sensor layer.
//!
//! Most deployments run with [`SensorConfig::default()`], which matches the
//! standard Raspberry Pi OS locations for the 1-Wire, GPIO and IIO sysfs trees.
//! Individual settings can be overridden from the environment with
//! [`SensorConfig::from_env()`].
//!
//! # Examples
//!
//! ```
//! # use terrarium_sensors::SensorConfig;
//! # use std::time::Duration;
//! let mut config = SensorConfig::default();
//! config.update_timeout = Duration::from_secs(60);
//! config.owfs_port = 4304;
//! assert!(config.validate().is_ok());
//! ```

use crate::{ENV_OWFS_PORT, ENV_OWSERVER_HOST, ENV_UPDATE_TIMEOUT, ENV_W1_PATH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Settings shared by every sensor created through one
/// [`SensorContext`](crate::SensorContext).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Minimum age of the last committed reading before `update()` reads
    /// the hardware again.
    pub update_timeout: Duration,
    /// Directory holding one sub-directory per 1-Wire slave.
    pub w1_base_path: PathBuf,
    /// Host running owserver.
    pub owserver_host: String,
    /// owserver TCP port. `0` disables the legacy 1-Wire controller.
    pub owfs_port: u16,
    /// Upper bound for one remote (HTTP) fetch.
    pub remote_timeout: Duration,
    /// Upper bound for one external script run.
    pub script_timeout: Duration,
    /// Root of the sysfs GPIO interface.
    pub gpio_sysfs_path: PathBuf,
    /// Root of the IIO device tree (ADC and DHT kernel drivers).
    pub iio_base_path: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            update_timeout: Duration::from_secs(crate::UPDATE_TIMEOUT_SECS),
            w1_base_path: PathBuf::from("/sys/bus/w1/devices/"),
            owserver_host: "127.0.0.1".to_string(),
            owfs_port: 0,
            remote_timeout: Duration::from_secs(3),
            script_timeout: Duration::from_secs(10),
            gpio_sysfs_path: PathBuf::from("/sys/class/gpio"),
            iio_base_path: PathBuf::from("/sys/bus/iio/devices"),
        }
    }
}

impl SensorConfig {
    /// Creates the default configuration with overrides from the environment.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secs_str) = std::env::var(ENV_UPDATE_TIMEOUT) {
            if let Ok(secs) = secs_str.parse::<u64>() {
                config.update_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(port_str) = std::env::var(ENV_OWFS_PORT) {
            if let Ok(port) = port_str.parse::<u16>() {
                config.owfs_port = port;
            }
        }

        if let Ok(host) = std::env::var(ENV_OWSERVER_HOST) {
            if !host.trim().is_empty() {
                config.owserver_host = host.trim().to_string();
            }
        }

        if let Ok(path) = std::env::var(ENV_W1_PATH) {
            if !path.trim().is_empty() {
                config.w1_base_path = PathBuf::from(path.trim());
            }
        }

        config
    }

    /// Configuration for tests: everything that could touch real hardware
    /// points at paths that do not exist, and the staleness window is
    /// long enough that only forced updates read twice.
    pub fn test_mode() -> Self {
        Self {
            w1_base_path: PathBuf::from("/nonexistent/w1"),
            gpio_sysfs_path: PathBuf::from("/nonexistent/gpio"),
            iio_base_path: PathBuf::from("/nonexistent/iio"),
            remote_timeout: Duration::from_secs(2),
            script_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Address of the owserver, if the legacy controller is enabled.
    pub fn owserver_addr(&self) -> Option<String> {
        (self.owfs_port > 0).then(|| format!("{}:{}", self.owserver_host, self.owfs_port))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTimeout`] if a read timeout is zero, and
    /// [`ConfigError::Invalid`] if the owserver host is empty while the
    /// controller is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("remote_timeout"));
        }

        if self.script_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("script_timeout"));
        }

        if self.owfs_port > 0 && self.owserver_host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "owserver host is empty while owfs_port is set".to_string(),
            ));
        }

        Ok(())
    }
}

/// An error indicating an invalid sensor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A timeout that bounds a blocking read is zero.
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    /// The configuration contains an invalid setting.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SensorConfig::default();
        assert_eq!(config.update_timeout, Duration::from_secs(30));
        assert_eq!(config.w1_base_path, PathBuf::from("/sys/bus/w1/devices/"));
        assert_eq!(config.owfs_port, 0);
        assert!(config.owserver_addr().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_owserver_addr() {
        let config = SensorConfig {
            owfs_port: 4304,
            ..SensorConfig::default()
        };
        assert_eq!(config.owserver_addr().as_deref(), Some("127.0.0.1:4304"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = SensorConfig {
            script_timeout: Duration::ZERO,
            ..SensorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("script_timeout"))
        ));
    }

    #[test]
    fn test_validate_empty_host() {
        let config = SensorConfig {
            owfs_port: 4304,
            owserver_host: " ".to_string(),
            ..SensorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::ZeroTimeout("remote_timeout");
        assert_eq!(error.to_string(), "remote_timeout must be greater than zero");

        let error = ConfigError::Invalid("bad value".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: bad value");
    }

    #[test]
    fn test_config_serialize() {
        let config = SensorConfig::test_mode();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SensorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.w1_base_path, config.w1_base_path);
        assert_eq!(parsed.update_timeout, config.update_timeout);
    }
}
