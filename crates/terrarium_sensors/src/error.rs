//! Error types for the sensor layer.
//!
//! Errors fall into two groups with very different lifetimes:
//!
//! - **Loading**: a sensor could not be bound to its hardware (unknown type,
//!   bad address, script that is missing or not executable). These surface
//!   immediately and prevent the sensor from being created.
//! - **Acquisition**: a bound driver failed to produce a sample (hardware
//!   unplugged, bus error, remote source down, script failed). These never
//!   leave [`Sensor::update`](crate::Sensor::update); they are logged and the
//!   previous reading is kept.
//!
//! # Examples
//!
//! ```
//! use terrarium_sensors::{Error, LoadingError};
//!
//! let err = Error::from(LoadingError::UnknownHardware("dht99".to_string()));
//! assert!(err.is_loading());
//! assert_eq!(err.code(), "E_LOAD_HARDWARE");
//! ```

use crate::config::ConfigError;
use crate::hal::HalError;
use crate::types::{HardwareType, MeasurementKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for sensor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type of the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A sensor could not be bound to its hardware.
    #[error("Loading error: {0}")]
    Loading(#[from] LoadingError),
    /// The sensor configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// An error from the underlying I/O system.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while binding a sensor to its hardware.
#[derive(Debug, Error)]
pub enum LoadingError {
    /// The hardware type is not one of the supported driver families.
    #[error("unknown hardware type '{0}'")]
    UnknownHardware(String),
    /// The measurement type is not one of the supported kinds.
    #[error("unknown measurement type '{0}'")]
    UnknownMeasurement(String),
    /// The hardware family cannot produce this kind of measurement.
    #[error("{hardware} hardware cannot measure {kind}")]
    UnsupportedMeasurement {
        hardware: HardwareType,
        kind: MeasurementKind,
    },
    /// The address could not be parsed for this hardware family.
    #[error("invalid address '{address}' for {hardware} sensor: {reason}")]
    InvalidAddress {
        hardware: HardwareType,
        address: String,
        reason: String,
    },
    /// The configured script does not exist.
    #[error("invalid script location: {}", .0.display())]
    ScriptNotFound(PathBuf),
    /// The configured script does not carry an allowed permission mode.
    #[error("script {} is not executable (mode {mode:03o})", path.display())]
    ScriptNotExecutable { path: PathBuf, mode: u32 },
    /// A pin or bus could not be claimed.
    #[error("could not claim hardware: {0}")]
    Hal(#[from] HalError),
}

/// Errors raised by a driver while acquiring one raw sample.
///
/// These are recovered inside the update loop and only ever logged.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The hardware is not there (unplugged, released, not exported).
    #[error("hardware not available: {0}")]
    Absent(String),
    /// Reading a device file or socket failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    /// The device answered with something that is not a reading.
    #[error("could not parse '{0}' as a reading")]
    Parse(String),
    /// A pin or bus operation failed.
    #[error("hardware error: {0}")]
    Hal(#[from] HalError),
    /// The remote source failed or returned unusable data.
    #[error("remote source error: {0}")]
    Remote(String),
    /// An external script exited unsuccessfully.
    #[error("script exited with status {code:?}")]
    ScriptFailed { code: Option<i32> },
    /// The read did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The source answered but has no fresh reading right now.
    #[error("no fresh reading available")]
    NoReading,
    /// A bus transfer failed its checksum.
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
}

impl From<reqwest::Error> for AcquireError {
    fn from(e: reqwest::Error) -> Self {
        AcquireError::Remote(e.to_string())
    }
}

impl Error {
    /// Returns `true` if the error prevented a sensor from being bound.
    pub fn is_loading(&self) -> bool {
        matches!(self, Error::Loading(_))
    }

    /// Returns an error code string for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Loading(e) => match e {
                LoadingError::UnknownHardware(_) => "E_LOAD_HARDWARE",
                LoadingError::UnknownMeasurement(_) => "E_LOAD_MEASUREMENT",
                LoadingError::UnsupportedMeasurement { .. } => "E_LOAD_UNSUPPORTED",
                LoadingError::InvalidAddress { .. } => "E_LOAD_ADDRESS",
                LoadingError::ScriptNotFound(_) => "E_LOAD_SCRIPT_MISSING",
                LoadingError::ScriptNotExecutable { .. } => "E_LOAD_SCRIPT_MODE",
                LoadingError::Hal(_) => "E_LOAD_HAL",
            },
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Serialization(_) => "E_SERIALIZATION",
        }
    }
}

impl AcquireError {
    /// Returns `true` when the failure means the hardware simply is not there.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            AcquireError::Absent(_) | AcquireError::ScriptFailed { .. } | AcquireError::Timeout(_)
        )
    }
}
