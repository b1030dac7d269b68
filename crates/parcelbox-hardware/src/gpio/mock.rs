//! In-memory GPIO bank.
//!
//! Doors start closed and solenoids start engaged. The paired
//! [`MockGpioHandle`] opens and closes doors, inspects outputs and injects
//! read or write failures.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{DeviceError, Result};
use crate::traits::GpioBus;

#[derive(Debug)]
struct MockGpioState {
    magnets: Vec<bool>,
    outputs: Vec<bool>,
    writes: Vec<(usize, bool)>,
    fail_reads: bool,
    fail_writes: bool,
}

type SharedState = Arc<Mutex<MockGpioState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockGpioState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated GPIO bank.
#[derive(Debug)]
pub struct MockGpio {
    state: SharedState,
    channels: usize,
}

impl MockGpio {
    /// Create a bank with `channels` lock channels.
    pub fn new(channels: usize) -> (Self, MockGpioHandle) {
        let state = Arc::new(Mutex::new(MockGpioState {
            magnets: vec![true; channels],
            outputs: vec![true; channels],
            writes: Vec::new(),
            fail_reads: false,
            fail_writes: false,
        }));
        let handle = MockGpioHandle {
            state: Arc::clone(&state),
        };
        (Self { state, channels }, handle)
    }

    fn check(&self, channel: usize) -> Result<()> {
        if channel < self.channels {
            Ok(())
        } else {
            Err(DeviceError::validation(format!(
                "lock channel {channel} is not wired"
            )))
        }
    }
}

impl GpioBus for MockGpio {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn read_magnet(&mut self, channel: usize) -> Result<bool> {
        self.check(channel)?;
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(DeviceError::transport("simulated magnet read failure"));
        }
        Ok(state.magnets[channel])
    }

    fn write_lock(&mut self, channel: usize, locked: bool) -> Result<()> {
        self.check(channel)?;
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(DeviceError::transport("simulated solenoid write failure"));
        }
        state.outputs[channel] = locked;
        state.writes.push((channel, locked));
        Ok(())
    }
}

/// Test-side controls of a [`MockGpio`].
#[derive(Debug, Clone)]
pub struct MockGpioHandle {
    state: SharedState,
}

impl MockGpioHandle {
    /// Set the magnet reading of a channel (`true` = door closed).
    ///
    /// Out-of-range channels are ignored.
    pub fn set_magnet(&self, channel: usize, closed: bool) {
        if let Some(magnet) = lock(&self.state).magnets.get_mut(channel) {
            *magnet = closed;
        }
    }

    /// Current solenoid output (`true` = locked).
    #[must_use]
    pub fn output(&self, channel: usize) -> Option<bool> {
        lock(&self.state).outputs.get(channel).copied()
    }

    /// Every output write so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(usize, bool)> {
        lock(&self.state).writes.clone()
    }

    /// Number of times the channel was driven to unlocked.
    #[must_use]
    pub fn unlock_writes(&self, channel: usize) -> usize {
        lock(&self.state)
            .writes
            .iter()
            .filter(|&&(ch, locked)| ch == channel && !locked)
            .count()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_closed_and_locked() {
        let (mut gpio, handle) = MockGpio::new(2);
        assert_eq!(gpio.channel_count(), 2);
        assert!(gpio.read_magnet(1).unwrap());
        assert_eq!(handle.output(0), Some(true));
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn test_handle_drives_state() {
        let (mut gpio, handle) = MockGpio::new(1);

        handle.set_magnet(0, false);
        assert!(!gpio.read_magnet(0).unwrap());

        gpio.write_lock(0, false).unwrap();
        gpio.write_lock(0, true).unwrap();
        assert_eq!(handle.writes(), vec![(0, false), (0, true)]);
        assert_eq!(handle.unlock_writes(0), 1);
        assert_eq!(handle.output(0), Some(true));
    }

    #[test]
    fn test_injected_failures() {
        let (mut gpio, handle) = MockGpio::new(1);

        handle.set_fail_reads(true);
        assert!(matches!(
            gpio.read_magnet(0),
            Err(DeviceError::Transport { .. })
        ));

        handle.set_fail_writes(true);
        assert!(gpio.write_lock(0, false).is_err());
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn test_out_of_range_channel() {
        let (mut gpio, _handle) = MockGpio::new(1);
        assert!(matches!(
            gpio.write_lock(1, true),
            Err(DeviceError::Validation { .. })
        ));
    }
}
