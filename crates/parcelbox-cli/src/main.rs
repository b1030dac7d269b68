//! `parcelboxd`: runs the parcel locker device controller.
//!
//! Configuration comes from `<DATA_PATH>/config.json` (created on first run)
//! and a few environment overrides:
//!
//! | Variable      | Effect                                        |
//! |---------------|-----------------------------------------------|
//! | `DATA_PATH`   | data directory, default `./data`              |
//! | `SERIAL_PATH` | serial device of the bridge                   |
//! | `BAUD_RATE`   | serial baud rate                              |
//! | `IS_PI`       | `true` drives the sysfs GPIO locks, else mock |
//! | `RUST_LOG`    | log filter, default `info,parcelbox=debug`    |
//!
//! The process exits non-zero when the serial link is lost for good.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use parcelbox_hardware::{AnyGpio, Device, MockGpio, SysfsGpio};
use parcelbox_kiosk::{Dashboard, KioskConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,parcelbox=debug";
const DEFAULT_DATA_PATH: &str = "./data";
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Settings resolved from the environment.
#[derive(Debug, Clone, PartialEq)]
struct Environment {
    data_dir: PathBuf,
    serial_path: Option<String>,
    baud_rate: Option<u32>,
    is_pi: bool,
}

impl Environment {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let baud_rate = lookup("BAUD_RATE")
            .map(|raw| {
                raw.trim()
                    .parse::<u32>()
                    .with_context(|| format!("BAUD_RATE is not a number: {raw}"))
            })
            .transpose()?;

        Ok(Self {
            data_dir: lookup("DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            serial_path: lookup("SERIAL_PATH").filter(|p| !p.trim().is_empty()),
            baud_rate,
            is_pi: lookup("IS_PI").is_some_and(|v| parse_flag(&v)),
        })
    }

    fn apply(&self, config: &mut KioskConfig) {
        if let Some(path) = &self.serial_path {
            config.device.serial.path = path.clone();
        }
        if let Some(baud) = self.baud_rate {
            config.device.serial.baud_rate = baud;
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let env = Environment::from_lookup(|key| std::env::var(key).ok())?;
    let mut config = KioskConfig::load_or_create(&env.data_dir)
        .with_context(|| format!("loading configuration from {}", env.data_dir.display()))?;
    env.apply(&mut config);
    info!(
        data_dir = %env.data_dir.display(),
        serial = %config.device.serial.path,
        baud = config.device.serial.baud_rate,
        tare = config.tare,
        is_pi = env.is_pi,
        version = env!("CARGO_PKG_VERSION"),
        "Starting parcelboxd"
    );

    let gpio = if env.is_pi {
        AnyGpio::Sysfs(SysfsGpio::open(config.gpio.clone()).context("opening GPIO locks")?)
    } else {
        warn!("Not running on the Pi, locks are simulated");
        AnyGpio::Mock(MockGpio::new(config.device.lock.channels).0)
    };

    let device = Device::builder(config.device.clone())
        .gpio(gpio)
        .start()
        .await
        .context("starting device")?;
    let dashboard = Dashboard::attach(device.clone());
    info!(mode = ?device.get_mode(), "Device started");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            _ = status.tick() => {
                let state = dashboard.states();
                debug!(mode = ?state.mode, ready = state.ready, sensors = ?state.sensors, "Status");
            }
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for ctrl-c")?;
                info!("Shutting down");
                device.close().await;
                return Ok(());
            }
            fatal = device.fatal() => {
                return match fatal {
                    Some(e) => {
                        error!(error = %e, "Device link lost, exiting");
                        Err(anyhow!(e))
                    }
                    None => Ok(()),
                };
            }
        }
    }
}
