//! Integration tests for bus discovery
//!
//! Builds a fake kernel 1-Wire tree and checks what `scan` binds from it.

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use terrarium_sensors::*;

fn w1_tree(slaves: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in slaves {
        let slave = dir.path().join(name);
        fs::create_dir_all(&slave).unwrap();
        fs::write(slave.join("w1_slave"), content).unwrap();
    }
    dir
}

fn context(dir: &TempDir, indicator: IndicatorFn) -> SensorContext {
    let config = SensorConfig {
        w1_base_path: dir.path().to_path_buf(),
        ..SensorConfig::test_mode()
    };
    SensorContext::new(Arc::new(MockHardware::new()), indicator, config).unwrap()
}

#[test]
fn test_scan_binds_w1_probes() {
    let dir = w1_tree(&[
        ("28-0000075c0a6b", "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n"),
        ("28-0000075d1c2e", "a0 01 4b 46 7f ff 0e 10 57 : crc=57 YES\na0 01 4b 46 7f ff 0e 10 57 t=26000\n"),
    ]);

    let report = scan(0, &context(&dir, units::imperial()));
    assert_eq!(report.sensors.len(), 2);

    let snapshots: Vec<SensorData> = report.sensors.iter().map(Sensor::get_data).collect();
    assert!(snapshots
        .iter()
        .all(|s| s.hardware_type == HardwareType::W1 && s.kind == MeasurementKind::Temperature));
    assert_eq!(snapshots[0].address, "28-0000075c0a6b");
    assert!((snapshots[0].current - 73.625).abs() < 1e-9);
    assert_eq!(snapshots[0].indicator, "F");
    assert!((snapshots[1].current - 78.8).abs() < 1e-9);
}

#[test]
fn test_scan_skips_unreadable_slaves() {
    let dir = w1_tree(&[
        ("28-0000075c0a6b", "crc=00 NO\n"),
        ("42-000000a1b2c3", "crc=57 YES\nt=21000\n"),
    ]);
    fs::create_dir_all(dir.path().join("28-000000000000")).unwrap();

    let report = scan(0, &context(&dir, units::metric()));
    let addresses: Vec<&str> = report.sensors.iter().map(Sensor::address).collect();
    assert_eq!(addresses, vec!["42-000000a1b2c3"]);
}
