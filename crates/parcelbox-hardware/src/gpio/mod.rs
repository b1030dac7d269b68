//! Solenoid outputs and magnet inputs.
//!
//! Production kiosks drive the locks through the Linux sysfs GPIO interface;
//! everywhere else a [`MockGpio`] bank stands in for the hardware.

pub mod mock;
pub mod sysfs;

use crate::error::Result;
use crate::traits::GpioBus;

pub use mock::{MockGpio, MockGpioHandle};
pub use sysfs::{LockPins, SysfsGpio, SysfsGpioConfig};

/// Enum wrapper for GPIO bank dispatch.
#[derive(Debug)]
pub enum AnyGpio {
    Sysfs(SysfsGpio),
    Mock(MockGpio),
}

impl GpioBus for AnyGpio {
    fn channel_count(&self) -> usize {
        match self {
            Self::Sysfs(gpio) => gpio.channel_count(),
            Self::Mock(gpio) => gpio.channel_count(),
        }
    }

    fn read_magnet(&mut self, channel: usize) -> Result<bool> {
        match self {
            Self::Sysfs(gpio) => gpio.read_magnet(channel),
            Self::Mock(gpio) => gpio.read_magnet(channel),
        }
    }

    fn write_lock(&mut self, channel: usize, locked: bool) -> Result<()> {
        match self {
            Self::Sysfs(gpio) => gpio.write_lock(channel, locked),
            Self::Mock(gpio) => gpio.write_lock(channel, locked),
        }
    }
}
