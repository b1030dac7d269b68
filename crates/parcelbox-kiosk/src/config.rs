//! Kiosk configuration file.
//!
//! The file lives at `<data_dir>/config.json` and holds the persisted tare
//! offset next to the device settings. A missing file is created with
//! defaults on first load.
//!
//! # Example
//!
//! ```no_run
//! use parcelbox_kiosk::KioskConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = KioskConfig::load_or_create("/var/lib/parcelbox")?;
//! config.tare = 98.5;
//! config.save("/var/lib/parcelbox")?;
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parcelbox_hardware::{DeviceConfig, SysfsGpioConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KioskError, KioskResult};

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Tare offset written to a fresh configuration, in grams.
pub const DEFAULT_TARE: f64 = 104.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Weight of the empty tray, subtracted from scale readings.
    pub tare: f64,
    pub device: DeviceConfig,
    /// Pin map used when the kiosk runs on the Raspberry Pi.
    pub gpio: SysfsGpioConfig,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            tare: DEFAULT_TARE,
            device: DeviceConfig::default(),
            gpio: SysfsGpioConfig::default(),
        }
    }
}

impl KioskConfig {
    /// Path of the configuration file inside `data_dir`.
    pub fn path_in(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join(CONFIG_FILE_NAME)
    }

    /// Load the configuration, writing defaults when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns `KioskError::Config` when the file exists but is not valid
    /// JSON, or an I/O error when it cannot be read or created.
    pub fn load_or_create(data_dir: impl AsRef<Path>) -> KioskResult<Self> {
        let data_dir = data_dir.as_ref();
        let path = Self::path_in(data_dir);

        match fs::read_to_string(&path) {
            Ok(raw) => {
                let config: Self = serde_json::from_str(&raw).map_err(|e| {
                    KioskError::Config(format!("{}: {e}", path.display()))
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "No config file found, creating a default one");
                let config = Self::default();
                config.save(data_dir)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the configuration to `<data_dir>/config.json`.
    ///
    /// The file is written next to its final location and renamed into place
    /// so a crash never leaves a truncated configuration behind.
    pub fn save(&self, data_dir: impl AsRef<Path>) -> KioskResult<()> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        let path = Self::path_in(data_dir);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(self)?)?;
        fs::rename(&staging, &path)?;

        info!(path = %path.display(), "Config file updated");
        Ok(())
    }

    /// Reject values the kiosk cannot run with.
    pub fn validate(&self) -> KioskResult<()> {
        if !self.tare.is_finite() {
            return Err(KioskError::Config("tare must be a finite number".into()));
        }
        self.device.validate()?;
        if self.gpio.channels.len() != self.device.lock.channels {
            return Err(KioskError::Config(format!(
                "gpio maps {} lock channels, device expects {}",
                self.gpio.channels.len(),
                self.device.lock.channels
            )));
        }
        Ok(())
    }
}
