//! Linux hardware provider.
//!
//! - GPIO: the sysfs interface (`export`, `gpioN/direction`, `gpioN/value`)
//! - I2C: `/dev/i2c-N` with the `I2C_SLAVE` ioctl
//! - ADC: the `mcp320x` IIO driver (`in_voltageN_raw`)
//! - DHT: the `dht11` IIO driver (`in_temp_input`, `in_humidityrelative_input`)

use super::{DhtModel, DhtSample, HalError, Hardware, I2cBus, InputLine, OutputLine, Pull};
use crate::config::SensorConfig;
use crate::types::GpioPin;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full scale of the 10-bit MCP3008.
const ADC_FULL_SCALE: f64 = 1023.0;

/// Hardware provider for a Raspberry Pi class Linux board.
#[derive(Debug, Clone)]
pub struct LinuxHardware {
    gpio_root: PathBuf,
    iio_root: PathBuf,
}

impl LinuxHardware {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            gpio_root: config.gpio_sysfs_path.clone(),
            iio_root: config.iio_base_path.clone(),
        }
    }

    /// Finds the first IIO device accepted by `matches(device_dir, name)`.
    fn find_iio_device(
        &self,
        what: &str,
        matches: impl Fn(&Path, &str) -> bool,
    ) -> Result<PathBuf, HalError> {
        let entries = fs::read_dir(&self.iio_root).map_err(|e| HalError::Device {
            path: self.iio_root.clone(),
            reason: e.to_string(),
        })?;

        entries
            .flatten()
            .map(|entry| entry.path())
            .find(|path| {
                let name = fs::read_to_string(path.join("name")).unwrap_or_default();
                matches(path, name.trim())
            })
            .ok_or_else(|| HalError::Unavailable(format!("no {} IIO device found", what)))
    }

    fn dht_device(&self, pin: GpioPin) -> Result<PathBuf, HalError> {
        // The dht11 overlay names its node `dht11@<pin in hex>`.
        let node_suffix = format!("@{:x}", pin.bcm());
        match self.find_iio_device("dht11", |path, name| {
            name == "dht11"
                && fs::read_link(path.join("of_node"))
                    .map(|target| target.to_string_lossy().ends_with(&node_suffix))
                    .unwrap_or(false)
        }) {
            Ok(path) => Ok(path),
            Err(_) => self.find_iio_device("dht11", |_, name| name == "dht11"),
        }
    }
}

impl Hardware for LinuxHardware {
    fn input(&self, pin: GpioPin, pull: Pull) -> Result<InputLine, HalError> {
        if pull != Pull::None {
            log::debug!(
                "sysfs GPIO cannot configure {:?} bias on {}, relying on board wiring",
                pull,
                pin
            );
        }
        Ok(Box::new(SysfsLine::claim(&self.gpio_root, pin, "in")?))
    }

    fn output(&self, pin: GpioPin) -> Result<OutputLine, HalError> {
        Ok(Box::new(SysfsLine::claim(&self.gpio_root, pin, "out")?))
    }

    #[cfg(target_os = "linux")]
    fn i2c(&self, bus: u8) -> Result<I2cBus, HalError> {
        Ok(Box::new(i2cdev::I2cDev::open(bus)?))
    }

    #[cfg(not(target_os = "linux"))]
    fn i2c(&self, bus: u8) -> Result<I2cBus, HalError> {
        Err(HalError::Unavailable(format!(
            "i2c bus {} requires Linux i2c-dev",
            bus
        )))
    }

    fn analog(&self, channel: u8) -> Result<f64, HalError> {
        let device = self.find_iio_device("mcp300x", |_, name| name.starts_with("mcp300"))?;
        let raw = read_attribute(&device.join(format!("in_voltage{}_raw", channel)))?;
        Ok(raw / ADC_FULL_SCALE)
    }

    fn dht(&self, _model: DhtModel, pin: GpioPin) -> Result<DhtSample, HalError> {
        // The kernel driver detects the model itself.
        let device = self.dht_device(pin)?;
        let temperature = read_attribute(&device.join("in_temp_input"))? / 1000.0;
        let humidity = read_attribute(&device.join("in_humidityrelative_input"))? / 1000.0;
        Ok(DhtSample {
            humidity,
            temperature,
        })
    }
}

fn read_attribute(path: &Path) -> Result<f64, HalError> {
    let raw = fs::read_to_string(path).map_err(|e| HalError::Device {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    raw.trim().parse::<f64>().map_err(|_| HalError::Device {
        path: path.to_path_buf(),
        reason: format!("unexpected value '{}'", raw.trim()),
    })
}

/// A sysfs GPIO line, unexported on drop.
struct SysfsLine {
    pin: GpioPin,
    root: PathBuf,
    value: File,
}

impl SysfsLine {
    fn claim(root: &Path, pin: GpioPin, direction: &str) -> Result<Self, HalError> {
        let gpio_err = |source| HalError::Gpio { pin, source };
        let line_dir = root.join(format!("gpio{}", pin.bcm()));
        if !line_dir.exists() {
            fs::write(root.join("export"), pin.bcm().to_string()).map_err(gpio_err)?;
        }

        // udev fixes permissions on freshly exported lines asynchronously
        let direction_path = line_dir.join("direction");
        let mut attempts = 0;
        loop {
            match fs::write(&direction_path, direction) {
                Ok(()) => break,
                Err(_) if attempts < 10 => {
                    attempts += 1;
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(source) => return Err(gpio_err(source)),
            }
        }

        let value = OpenOptions::new()
            .read(true)
            .write(true)
            .open(line_dir.join("value"))
            .map_err(gpio_err)?;

        log::debug!("Claimed {} as {}", pin, direction);
        Ok(Self {
            pin,
            root: root.to_path_buf(),
            value,
        })
    }

    fn level(&self) -> Result<bool, HalError> {
        let mut buf = [0u8; 1];
        self.value
            .read_at(&mut buf, 0)
            .map_err(|source| HalError::Gpio {
                pin: self.pin,
                source,
            })?;
        Ok(buf[0] == b'1')
    }

    fn drive(&self, high: bool) -> Result<(), HalError> {
        let level: &[u8] = if high { b"1" } else { b"0" };
        self.value
            .write_at(level, 0)
            .map(|_| ())
            .map_err(|source| HalError::Gpio {
                pin: self.pin,
                source,
            })
    }
}

impl Drop for SysfsLine {
    fn drop(&mut self) {
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.bcm().to_string()) {
            log::warn!("Could not release {}: {}", self.pin, e);
        } else {
            log::debug!("Released {}", self.pin);
        }
    }
}

impl ErrorType for SysfsLine {
    type Error = HalError;
}

impl InputPin for SysfsLine {
    fn is_high(&mut self) -> Result<bool, HalError> {
        self.level()
    }

    fn is_low(&mut self) -> Result<bool, HalError> {
        self.level().map(|high| !high)
    }
}

impl OutputPin for SysfsLine {
    fn set_low(&mut self) -> Result<(), HalError> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), HalError> {
        self.drive(true)
    }
}

#[cfg(target_os = "linux")]
mod i2cdev {
    use crate::hal::HalError;
    use embedded_hal::i2c::{ErrorType, I2c, Operation};
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::unix::io::AsRawFd;

    /// `linux/i2c-dev.h`
    const I2C_SLAVE: libc::c_ulong = 0x0703;

    /// An open `/dev/i2c-N` character device.
    pub(super) struct I2cDev {
        bus: u8,
        file: File,
        address: Option<u8>,
    }

    impl I2cDev {
        pub(super) fn open(bus: u8) -> Result<Self, HalError> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(format!("/dev/i2c-{}", bus))
                .map_err(|source| HalError::I2c { bus, source })?;
            Ok(Self {
                bus,
                file,
                address: None,
            })
        }

        fn select(&mut self, address: u8) -> Result<(), HalError> {
            if self.address == Some(address) {
                return Ok(());
            }
            // SAFETY: the descriptor stays open for the lifetime of `self` and
            // I2C_SLAVE takes the 7-bit address by value.
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    I2C_SLAVE as _,
                    libc::c_ulong::from(address),
                )
            };
            if rc < 0 {
                return Err(HalError::I2c {
                    bus: self.bus,
                    source: std::io::Error::last_os_error(),
                });
            }
            self.address = Some(address);
            Ok(())
        }
    }

    impl ErrorType for I2cDev {
        type Error = HalError;
    }

    impl I2c for I2cDev {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), HalError> {
            self.select(address)?;
            for operation in operations.iter_mut() {
                let result = match operation {
                    Operation::Read(buf) => self.file.read_exact(&mut buf[..]),
                    Operation::Write(bytes) => self.file.write_all(&bytes[..]),
                };
                result.map_err(|source| HalError::I2c {
                    bus: self.bus,
                    source,
                })?;
            }
            Ok(())
        }
    }
}
