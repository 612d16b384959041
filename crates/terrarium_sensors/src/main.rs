//! Terrarium sensor CLI
//!
//! Reads single sensors or discovers bus-attached probes and prints their
//! snapshots as JSON.
//!
//! ## Usage
//!
//! ```bash
//! # Discover 1-Wire probes (kernel bus and owserver on port 4304)
//! terrarium-sensors scan --owfs-port 4304
//!
//! # Read one sensor in imperial units
//! terrarium-sensors read --hardware sht2x --type temperature --address 1,0x40 --unit imperial
//!
//! # Longer staleness window
//! TERRARIUM_UPDATE_TIMEOUT_SECS=60 terrarium-sensors scan
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use terrarium_sensors::{
    scan, units, IndicatorFn, Result, Sensor, SensorConfig, SensorContext, SensorData,
    SensorDefinition,
};

#[derive(Parser)]
#[command(name = "terrarium-sensors", version, about = "Terrarium sensor reader")]
struct Cli {
    /// Display units for temperatures and distances
    #[arg(long, value_enum, global = true, default_value_t = Unit::Metric)]
    unit: Unit,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover temperature/humidity probes on the 1-Wire buses
    Scan {
        /// owserver TCP port, 0 to skip owserver
        #[arg(long)]
        owfs_port: Option<u16>,
    },
    /// Read one sensor
    Read {
        /// Hardware family, e.g. w1, sht2x, hc-sr04
        #[arg(long)]
        hardware: String,
        /// Measurement kind, e.g. temperature, humidity
        #[arg(long = "type")]
        kind: String,
        /// Hardware address, e.g. 28-0000075c0a6b or 1,0x40
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "")]
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Unit {
    Metric,
    Imperial,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!("{} ({})", e, e.code());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = SensorConfig::from_env();
    let indicator = match cli.unit {
        Unit::Metric => units::metric(),
        Unit::Imperial => units::imperial(),
    };

    match cli.command {
        Command::Scan { owfs_port } => {
            let port = owfs_port.unwrap_or(config.owfs_port);
            let ctx = context(config, indicator)?;
            let report = scan(port, &ctx);
            let snapshots: Vec<SensorData> = report.sensors.iter().map(Sensor::get_data).collect();
            print_json(&snapshots)
        }
        Command::Read {
            hardware,
            kind,
            address,
            name,
        } => {
            let ctx = context(config, indicator)?;
            let sensor = Sensor::new(
                SensorDefinition::new(&hardware, &kind, &address).with_name(&name),
                &ctx,
            )?;
            info!("{} last read at {}", sensor.id(), sensor.last_update());
            print_json(&sensor.get_data())
        }
    }
}

#[cfg(unix)]
fn context(config: SensorConfig, indicator: IndicatorFn) -> Result<SensorContext> {
    SensorContext::linux(config, indicator)
}

#[cfg(not(unix))]
fn context(config: SensorConfig, indicator: IndicatorFn) -> Result<SensorContext> {
    log::warn!("No kernel hardware interfaces on this platform, using mock hardware");
    SensorContext::new(
        std::sync::Arc::new(terrarium_sensors::MockHardware::new()),
        indicator,
        config,
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
