//! Discovery of bus-attached temperature and humidity probes.

use crate::drivers::parse_w1_slave;
use crate::owfs::OwClient;
use crate::sensor::{Sensor, SensorContext, SensorDefinition};
use crate::types::{HardwareType, MeasurementKind};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 1-Wire slave directories start with a two digit family code.
static W1_SLAVE_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]-").expect("w1 slave pattern is valid"));

/// Sensors found by one [`scan`].
#[derive(Debug)]
pub struct ScanReport {
    pub sensors: Vec<Sensor>,
    pub elapsed: Duration,
}

/// Finds every temperature and humidity probe on the owserver at `port` (when
/// non-zero) and on the kernel 1-Wire bus, and binds a sensor to each.
///
/// A missing owserver or 1-Wire tree only means fewer sensors.
pub fn scan(port: u16, ctx: &SensorContext) -> ScanReport {
    let started = Instant::now();
    debug!("Start scanning for temperature/humidity sensors");

    let mut sensors = Vec::new();
    if port > 0 {
        let mut config = (*ctx.config).clone();
        config.owfs_port = port;
        let owfs_ctx = SensorContext {
            config: Arc::new(config),
            ..ctx.clone()
        };
        sensors.extend(scan_owfs(&owfs_ctx));
    }
    sensors.extend(scan_w1(ctx));

    let elapsed = started.elapsed();
    info!(
        "Found {} temperature/humidity sensors in {:.5} seconds",
        sensors.len(),
        elapsed.as_secs_f64()
    );
    ScanReport { sensors, elapsed }
}

fn scan_owfs(ctx: &SensorContext) -> Vec<Sensor> {
    let Some(addr) = ctx.config.owserver_addr() else {
        return Vec::new();
    };
    let client = OwClient::new(addr, ctx.config.remote_timeout);
    let devices = match client.devices() {
        Ok(devices) => devices,
        Err(e) => {
            debug!("OWFS is not active on {}: {}", client.addr(), e);
            return Vec::new();
        }
    };

    let mut sensors = Vec::new();
    for device in devices {
        let entries = match client.entries(&device) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not list OWFS device {}: {}", device, e);
                continue;
            }
        };
        for kind in [MeasurementKind::Temperature, MeasurementKind::Humidity] {
            if entries.iter().any(|entry| entry == kind.as_str()) {
                bind(HardwareType::Owfs, kind, &device, ctx, &mut sensors);
            }
        }
    }
    sensors
}

fn scan_w1(ctx: &SensorContext) -> Vec<Sensor> {
    let base = &ctx.config.w1_base_path;
    let mut slaves: Vec<String> = match fs::read_dir(base) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| W1_SLAVE_DIR.is_match(name))
            .collect(),
        Err(e) => {
            debug!("No 1-Wire bus at {}: {}", base.display(), e);
            return Vec::new();
        }
    };
    slaves.sort();

    let mut sensors = Vec::new();
    for slave in slaves {
        let file = base.join(&slave).join("w1_slave");
        if let Some(kind) = probe_w1(&file) {
            bind(HardwareType::W1, kind, &slave, ctx, &mut sensors);
        }
    }
    sensors
}

fn probe_w1(file: &Path) -> Option<MeasurementKind> {
    if !file.is_file() {
        debug!("Skipping {}: no w1_slave", file.display());
        return None;
    }
    match fs::read_to_string(file) {
        Ok(data) => parse_w1_slave(&data).map(|(kind, _)| kind),
        Err(e) => {
            warn!("Could not read {}: {}", file.display(), e);
            None
        }
    }
}

fn bind(
    hardware: HardwareType,
    kind: MeasurementKind,
    address: &str,
    ctx: &SensorContext,
    sensors: &mut Vec<Sensor>,
) {
    let definition = SensorDefinition::new(hardware.as_str(), kind.as_str(), address);
    match Sensor::new(definition, ctx) {
        Ok(sensor) => sensors.push(sensor),
        Err(e) => warn!("Could not load {} {} sensor at {}: {}", hardware, kind, address, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::hal::MockHardware;
    use crate::owfs::fake;
    use crate::units;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn context(config: SensorConfig) -> SensorContext {
        SensorContext::new(Arc::new(MockHardware::new()), units::metric(), config).unwrap()
    }

    fn w1_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in [
            ("28-0000075c0a6b", Some("crc=57 YES\nt=21000\n")),
            ("26-000001a2b3c4", Some("crc=11 YES\nf=55500\n")),
            ("10-000000000001", None),
            ("00-000000000002", Some("t=1000\n")),
            ("w1_bus_master1", None),
        ] {
            let slave = dir.path().join(name);
            fs::create_dir_all(&slave).unwrap();
            if let Some(content) = content {
                fs::write(slave.join("w1_slave"), content).unwrap();
            }
        }
        dir
    }

    #[test]
    fn test_scan_w1_tree() {
        let dir = w1_tree();
        let ctx = context(SensorConfig {
            w1_base_path: dir.path().to_path_buf(),
            ..SensorConfig::test_mode()
        });

        let report = scan(0, &ctx);
        let found: Vec<(String, MeasurementKind, f64)> = report
            .sensors
            .iter()
            .map(|s| (s.address().to_string(), s.kind(), s.get_current()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("26-000001a2b3c4".to_string(), MeasurementKind::Humidity, 55.5),
                ("28-0000075c0a6b".to_string(), MeasurementKind::Temperature, 21.0),
            ]
        );
        assert_eq!(
            report.sensors[1].id(),
            crate::sensor_id("28-0000075c0a6b", MeasurementKind::Temperature)
        );
    }

    #[test]
    fn test_scan_without_buses() {
        let report = scan(0, &context(SensorConfig::test_mode()));
        assert!(report.sensors.is_empty());
    }

    #[test]
    fn test_scan_owserver_not_running() {
        let report = scan(1, &context(SensorConfig::test_mode()));
        assert!(report.sensors.is_empty());
    }

    #[test]
    fn test_scan_owserver() {
        let dirs = HashMap::from([
            (
                "/".to_string(),
                "/10.67C6697351FF,/26.A2D5E8000000,/settings".to_string(),
            ),
            (
                "/10.67C6697351FF".to_string(),
                "/10.67C6697351FF/address,/10.67C6697351FF/temperature".to_string(),
            ),
            (
                "/26.A2D5E8000000".to_string(),
                "/26.A2D5E8000000/humidity,/26.A2D5E8000000/temperature".to_string(),
            ),
        ]);
        let values = HashMap::from([
            ("/10.67C6697351FF/temperature".to_string(), "   24.5".to_string()),
            ("/26.A2D5E8000000/temperature".to_string(), "   22".to_string()),
            ("/26.A2D5E8000000/humidity".to_string(), "   61.25".to_string()),
        ]);
        let addr = fake::serve(dirs, values);
        let port: u16 = addr.rsplit(':').next().unwrap().parse().unwrap();

        let report = scan(port, &context(SensorConfig::test_mode()));
        let found: Vec<(HardwareType, String, MeasurementKind, f64)> = report
            .sensors
            .iter()
            .map(|s| {
                (
                    s.hardware_type(),
                    s.address().to_string(),
                    s.kind(),
                    s.get_current(),
                )
            })
            .collect();
        assert_eq!(
            found,
            vec![
                (
                    HardwareType::Owfs,
                    "10.67C6697351FF".to_string(),
                    MeasurementKind::Temperature,
                    24.5
                ),
                (
                    HardwareType::Owfs,
                    "26.A2D5E8000000".to_string(),
                    MeasurementKind::Temperature,
                    22.0
                ),
                (
                    HardwareType::Owfs,
                    "26.A2D5E8000000".to_string(),
                    MeasurementKind::Humidity,
                    61.25
                ),
            ]
        );
    }
}
