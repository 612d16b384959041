//! Readings produced by an external executable.

use crate::config::SensorConfig;
use crate::error::{AcquireError, LoadingError};
use crate::script::{ScriptCommand, ScriptRole, NO_READING};
use log::debug;

pub struct ScriptDriver {
    command: ScriptCommand,
}

impl ScriptDriver {
    pub(super) fn bind(address: &str, config: &SensorConfig) -> Result<Self, LoadingError> {
        Ok(Self {
            command: ScriptCommand::load(address, ScriptRole::Sensor, config.script_timeout)?,
        })
    }

    /// The sentinel output is [`AcquireError::NoReading`], never a sample.
    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        let value = self.command.query()?;
        if value == NO_READING {
            debug!("{} has no fresh reading", self.command.program().display());
            return Err(AcquireError::NoReading);
        }
        Ok(value)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn bind(dir: &TempDir, body: &str) -> ScriptDriver {
        let path = dir.path().join("sensor.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        ScriptDriver::bind(path.to_str().unwrap(), &SensorConfig::test_mode())
            .ok()
            .unwrap()
    }

    #[test]
    fn test_value_passes_through() {
        let dir = TempDir::new().unwrap();
        assert_eq!(bind(&dir, "echo 6.8").acquire().unwrap(), 6.8);
    }

    #[test]
    fn test_sentinel_is_no_reading() {
        let dir = TempDir::new().unwrap();
        let mut driver = bind(&dir, "echo -1.0");
        assert!(matches!(driver.acquire(), Err(AcquireError::NoReading)));
        assert!(matches!(driver.acquire(), Err(AcquireError::NoReading)));
    }

    #[test]
    fn test_bind_checks_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sensor.sh");
        fs::write(&path, "#!/bin/sh\necho 1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o744)).unwrap();
        assert!(matches!(
            ScriptDriver::bind(path.to_str().unwrap(), &SensorConfig::test_mode()),
            Err(LoadingError::ScriptNotExecutable { .. })
        ));
    }
}
