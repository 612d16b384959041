//! Unit & indicator resolution.
//!
//! Sensors always store values in their native unit (°C, cm, %, pH). Which
//! unit is *displayed* is decided outside the sensor layer: every sensor holds
//! an [`IndicatorFn`] that maps its measurement kind to an indicator token,
//! and readings are converted on the way out.
//!
//! | Indicator | Conversion |
//! |-----------|------------|
//! | `F` | Celsius → Fahrenheit |
//! | `inch` | centimeters → inches |
//! | anything else | none |

use crate::types::MeasurementKind;
use std::sync::Arc;

/// Callback resolving the display indicator for a measurement kind.
pub type IndicatorFn = Arc<dyn Fn(MeasurementKind) -> String + Send + Sync>;

const CM_PER_INCH: f64 = 2.54;

/// Metric indicators: `C`, `%`, `cm`, `pH`.
pub fn metric() -> IndicatorFn {
    Arc::new(|kind| metric_indicator(kind).to_string())
}

/// Imperial indicators: `F` for temperature and `inch` for distance.
pub fn imperial() -> IndicatorFn {
    Arc::new(|kind| match kind {
        MeasurementKind::Temperature => "F".to_string(),
        MeasurementKind::Distance => "inch".to_string(),
        other => metric_indicator(other).to_string(),
    })
}

fn metric_indicator(kind: MeasurementKind) -> &'static str {
    match kind {
        MeasurementKind::Temperature => "C",
        MeasurementKind::Humidity | MeasurementKind::Moisture => "%",
        MeasurementKind::Distance => "cm",
        MeasurementKind::Ph => "pH",
    }
}

pub fn to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn to_inches(centimeters: f64) -> f64 {
    centimeters / CM_PER_INCH
}

pub fn to_centimeters(inches: f64) -> f64 {
    inches * CM_PER_INCH
}

/// Converts a native value into the unit named by `indicator`.
pub fn to_display(native: f64, indicator: &str) -> f64 {
    match indicator.to_ascii_lowercase().as_str() {
        "f" => to_fahrenheit(native),
        "inch" => to_inches(native),
        _ => native,
    }
}

/// Converts a value in the unit named by `indicator` back into the native unit.
pub fn to_native(display: f64, indicator: &str) -> f64 {
    match indicator.to_ascii_lowercase().as_str() {
        "f" => to_celsius(display),
        "inch" => to_centimeters(display),
        _ => display,
    }
}
