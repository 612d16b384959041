//! Core identifiers shared by the sensor layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardware families a sensor can be bound to.
///
/// The string form (`"w1"`, `"hc-sr04"`, ...) is what configuration files and
/// the snapshot's `hardwaretype` field carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareType {
    /// Legacy 1-Wire controller reached through owserver
    #[serde(rename = "owfs")]
    Owfs,
    /// Kernel 1-Wire bus files
    #[serde(rename = "w1")]
    W1,
    /// Value fetched from a URL
    #[serde(rename = "remote")]
    Remote,
    /// Ultrasonic distance sensor
    #[serde(rename = "hc-sr04")]
    HcSr04,
    /// Analog pH probe on an MCP3008 channel
    #[serde(rename = "sku-sen0161")]
    SkuSen0161,
    #[serde(rename = "dht11")]
    Dht11,
    #[serde(rename = "dht22")]
    Dht22,
    #[serde(rename = "am2302")]
    Am2302,
    #[serde(rename = "sht2x")]
    Sht2x,
    #[serde(rename = "htu21d")]
    Htu21d,
    #[serde(rename = "si7021")]
    Si7021,
    #[serde(rename = "bme280")]
    Bme280,
    /// Binary soil moisture probe (YL-69 / YT-xx digital output)
    #[serde(rename = "ytxx-digital")]
    YtxxDigital,
    /// External executable
    #[serde(rename = "script")]
    Script,
}

impl HardwareType {
    /// All supported hardware families.
    pub const ALL: [HardwareType; 14] = [
        HardwareType::Owfs,
        HardwareType::W1,
        HardwareType::Remote,
        HardwareType::HcSr04,
        HardwareType::SkuSen0161,
        HardwareType::Dht11,
        HardwareType::Dht22,
        HardwareType::Am2302,
        HardwareType::Sht2x,
        HardwareType::Htu21d,
        HardwareType::Si7021,
        HardwareType::Bme280,
        HardwareType::YtxxDigital,
        HardwareType::Script,
    ];

    /// Configuration name of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareType::Owfs => "owfs",
            HardwareType::W1 => "w1",
            HardwareType::Remote => "remote",
            HardwareType::HcSr04 => "hc-sr04",
            HardwareType::SkuSen0161 => "sku-sen0161",
            HardwareType::Dht11 => "dht11",
            HardwareType::Dht22 => "dht22",
            HardwareType::Am2302 => "am2302",
            HardwareType::Sht2x => "sht2x",
            HardwareType::Htu21d => "htu21d",
            HardwareType::Si7021 => "si7021",
            HardwareType::Bme280 => "bme280",
            HardwareType::YtxxDigital => "ytxx-digital",
            HardwareType::Script => "script",
        }
    }

    /// Whether this family can produce the given measurement.
    pub fn supports(&self, kind: MeasurementKind) -> bool {
        use MeasurementKind::*;
        match self {
            HardwareType::Owfs
            | HardwareType::W1
            | HardwareType::Dht11
            | HardwareType::Dht22
            | HardwareType::Am2302
            | HardwareType::Sht2x
            | HardwareType::Htu21d
            | HardwareType::Si7021
            | HardwareType::Bme280 => matches!(kind, Temperature | Humidity),
            HardwareType::HcSr04 => kind == Distance,
            HardwareType::SkuSen0161 => kind == Ph,
            HardwareType::YtxxDigital => kind == Moisture,
            HardwareType::Remote | HardwareType::Script => true,
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        HardwareType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| s.to_string())
    }
}

/// Physical quantity a sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    /// Degrees Celsius
    Temperature,
    /// Relative humidity (%)
    Humidity,
    /// Soil moisture (binary probe: 1 dry, 0 wet)
    Moisture,
    /// Centimeters
    Distance,
    /// pH
    Ph,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 5] = [
        MeasurementKind::Temperature,
        MeasurementKind::Humidity,
        MeasurementKind::Moisture,
        MeasurementKind::Distance,
        MeasurementKind::Ph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::Temperature => "temperature",
            MeasurementKind::Humidity => "humidity",
            MeasurementKind::Moisture => "moisture",
            MeasurementKind::Distance => "distance",
            MeasurementKind::Ph => "ph",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MeasurementKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| s.to_string())
    }
}

/// Read-only snapshot of a sensor, as consumed by the API and automation layers.
///
/// Field names on the wire are stable: `id, hardwaretype, address, type,
/// indicator, name, current, alarm_min, alarm_max, limit_min, limit_max, alarm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub id: String,
    #[serde(rename = "hardwaretype")]
    pub hardware_type: HardwareType,
    pub address: String,
    #[serde(rename = "type")]
    pub kind: MeasurementKind,
    /// Display unit the `current` value is expressed in
    pub indicator: String,
    pub name: String,
    /// Current value in display units
    pub current: f64,
    pub alarm_min: f64,
    pub alarm_max: f64,
    pub limit_min: f64,
    pub limit_max: f64,
    /// Whether `current` is outside the alarm window
    pub alarm: bool,
}

/// A GPIO line in BCM numbering.
///
/// Addresses name pins either as `gpioN` (BCM, also accepted as `bcmN`) or as
/// a physical pin number on the Raspberry Pi 40-pin header.
///
/// ```
/// # use terrarium_sensors::GpioPin;
/// assert_eq!("gpio17".parse::<GpioPin>().unwrap().bcm(), 17);
/// assert_eq!("11".parse::<GpioPin>().unwrap().bcm(), 17);
/// assert!("1".parse::<GpioPin>().is_err()); // 3.3V power pin
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GpioPin(u8);

/// Physical header pin -> BCM line. Power and ground pins map to `None`.
const PHYSICAL_TO_BCM: [Option<u8>; 41] = [
    None,     // 0 (unused)
    None,     // 1 3.3V
    None,     // 2 5V
    Some(2),  // 3
    None,     // 4 5V
    Some(3),  // 5
    None,     // 6 GND
    Some(4),  // 7
    Some(14), // 8
    None,     // 9 GND
    Some(15), // 10
    Some(17), // 11
    Some(18), // 12
    Some(27), // 13
    None,     // 14 GND
    Some(22), // 15
    Some(23), // 16
    None,     // 17 3.3V
    Some(24), // 18
    Some(10), // 19
    None,     // 20 GND
    Some(9),  // 21
    Some(25), // 22
    Some(11), // 23
    Some(8),  // 24
    None,     // 25 GND
    Some(7),  // 26
    Some(0),  // 27
    Some(1),  // 28
    Some(5),  // 29
    None,     // 30 GND
    Some(6),  // 31
    Some(12), // 32
    Some(13), // 33
    None,     // 34 GND
    Some(19), // 35
    Some(16), // 36
    Some(26), // 37
    Some(20), // 38
    None,     // 39 GND
    Some(21), // 40
];

/// Highest BCM line on the 40-pin header.
const MAX_BCM: u8 = 27;

impl GpioPin {
    /// Creates a pin from a BCM line number.
    pub fn from_bcm(bcm: u8) -> Option<Self> {
        (bcm <= MAX_BCM).then_some(GpioPin(bcm))
    }

    /// Creates a pin from a physical header position.
    pub fn from_physical(pin: u8) -> Option<Self> {
        PHYSICAL_TO_BCM
            .get(usize::from(pin))
            .copied()
            .flatten()
            .map(GpioPin)
    }

    pub fn bcm(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpio{}", self.0)
    }
}

impl FromStr for GpioPin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (number, bcm) = match s.strip_prefix("gpio").or_else(|| s.strip_prefix("bcm")) {
            Some(rest) => (rest, true),
            None => (s.as_str(), false),
        };
        let number: u8 = number
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a pin number", s))?;
        let pin = if bcm {
            GpioPin::from_bcm(number)
        } else {
            GpioPin::from_physical(number)
        };
        pin.ok_or_else(|| format!("'{}' is not a usable GPIO pin", s))
    }
}
