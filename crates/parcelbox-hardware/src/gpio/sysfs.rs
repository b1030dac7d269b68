//! Linux sysfs GPIO backend (`/sys/class/gpio`).
//!
//! Each lock channel uses two pins: an input wired to the door magnet sensor
//! and an output that drives the solenoid. Pins are exported on open when the
//! kernel has not exported them yet. Every output starts engaged (locked).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DeviceError, Result};
use crate::traits::GpioBus;

const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Pin numbers of one lock channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPins {
    /// Input pin of the magnet sensor.
    pub magnet: u32,
    /// Output pin of the solenoid.
    pub solenoid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsGpioConfig {
    pub root: PathBuf,
    pub channels: Vec<LockPins>,
}

impl Default for SysfsGpioConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_GPIO_ROOT),
            channels: vec![LockPins {
                magnet: 27,
                solenoid: 17,
            }],
        }
    }
}

/// GPIO bank backed by sysfs files.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    channels: Vec<LockPins>,
}

impl SysfsGpio {
    /// Export and configure every pin, then engage all solenoids.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Transport` if a pin cannot be exported or
    /// configured.
    pub fn open(config: SysfsGpioConfig) -> Result<Self> {
        let gpio = Self {
            root: config.root,
            channels: config.channels,
        };

        for pins in &gpio.channels {
            gpio.export(pins.magnet, "in")?;
            gpio.export(pins.solenoid, "out")?;
            write_value(&gpio.value_path(pins.solenoid), true)?;
        }

        info!(
            root = %gpio.root.display(),
            channels = gpio.channels.len(),
            "GPIO bank ready"
        );
        Ok(gpio)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.pin_dir(pin).join("value")
    }

    fn export(&self, pin: u32, direction: &str) -> Result<()> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            debug!(pin, "Exporting GPIO pin");
            fs::write(self.root.join("export"), pin.to_string())
                .map_err(|e| DeviceError::transport(format!("export of gpio{pin} failed: {e}")))?;
        }
        if !dir.exists() {
            return Err(DeviceError::transport(format!(
                "gpio{pin} not present after export"
            )));
        }

        fs::write(dir.join("direction"), direction)
            .map_err(|e| DeviceError::transport(format!("gpio{pin} direction: {e}")))
    }

    fn pins(&self, channel: usize) -> Result<LockPins> {
        self.channels.get(channel).copied().ok_or_else(|| {
            DeviceError::validation(format!("lock channel {channel} is not wired"))
        })
    }
}

fn write_value(path: &Path, high: bool) -> Result<()> {
    fs::write(path, if high { "1" } else { "0" })
        .map_err(|e| DeviceError::transport(format!("{}: {e}", path.display())))
}

impl GpioBus for SysfsGpio {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn read_magnet(&mut self, channel: usize) -> Result<bool> {
        let path = self.value_path(self.pins(channel)?.magnet);
        let raw = fs::read_to_string(&path)
            .map_err(|e| DeviceError::transport(format!("{}: {e}", path.display())))?;
        Ok(raw.trim() == "1")
    }

    fn write_lock(&mut self, channel: usize, locked: bool) -> Result<()> {
        let path = self.value_path(self.pins(channel)?.solenoid);
        write_value(&path, locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PINS: LockPins = LockPins {
        magnet: 27,
        solenoid: 17,
    };

    fn exported_root() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        for pin in [PINS.magnet, PINS.solenoid] {
            let dir = root.path().join(format!("gpio{pin}"));
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("value"), "0").unwrap();
        }
        root
    }

    fn config(root: &TempDir) -> SysfsGpioConfig {
        SysfsGpioConfig {
            root: root.path().to_path_buf(),
            channels: vec![PINS],
        }
    }

    fn read(root: &TempDir, pin: u32, file: &str) -> String {
        fs::read_to_string(root.path().join(format!("gpio{pin}")).join(file)).unwrap()
    }

    #[test]
    fn test_open_configures_pins_and_locks() {
        let root = exported_root();
        let gpio = SysfsGpio::open(config(&root)).unwrap();

        assert_eq!(gpio.channel_count(), 1);
        assert_eq!(read(&root, 27, "direction"), "in");
        assert_eq!(read(&root, 17, "direction"), "out");
        assert_eq!(read(&root, 17, "value"), "1");
    }

    #[test]
    fn test_read_magnet() {
        let root = exported_root();
        let mut gpio = SysfsGpio::open(config(&root)).unwrap();

        fs::write(root.path().join("gpio27/value"), "1\n").unwrap();
        assert!(gpio.read_magnet(0).unwrap());
        fs::write(root.path().join("gpio27/value"), "0\n").unwrap();
        assert!(!gpio.read_magnet(0).unwrap());
    }

    #[test]
    fn test_write_lock() {
        let root = exported_root();
        let mut gpio = SysfsGpio::open(config(&root)).unwrap();

        gpio.write_lock(0, false).unwrap();
        assert_eq!(read(&root, 17, "value"), "0");
        gpio.write_lock(0, true).unwrap();
        assert_eq!(read(&root, 17, "value"), "1");
    }

    #[test]
    fn test_unwired_channel_is_rejected() {
        let root = exported_root();
        let mut gpio = SysfsGpio::open(config(&root)).unwrap();

        assert!(matches!(
            gpio.read_magnet(3),
            Err(DeviceError::Validation { .. })
        ));
    }

    #[test]
    fn test_export_requested_for_missing_pin() {
        let root = tempfile::tempdir().unwrap();
        let err = SysfsGpio::open(config(&root)).unwrap_err();

        assert!(matches!(err, DeviceError::Transport { .. }));
        assert_eq!(fs::read_to_string(root.path().join("export")).unwrap(), "27");
    }
}
