//! Seams between the control tasks and the physical media.
//!
//! The serial link and the GPIO bank each have a real backend and a mock
//! backend. The control tasks only talk to these traits; concrete backends
//! are selected through the enum wrappers in [`crate::link`] and
//! [`crate::gpio`].

#![allow(async_fn_in_trait)]

use crate::error::Result;

/// Write half of a bridge link.
pub trait LinkWriter: Send {
    /// Write one line. The terminator is appended by the implementation.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Transport` if the write did not reach the medium.
    async fn write_line(&mut self, line: &str) -> Result<()>;
}

/// Bank of solenoid outputs and magnet inputs, one pair per lock channel.
///
/// Channels are zero-based. Output `true` engages the solenoid (locked);
/// input `true` means the magnet is detected (door closed).
pub trait GpioBus: Send {
    /// Number of lock channels wired to this bank.
    fn channel_count(&self) -> usize;

    /// Read the magnet sensor of one channel.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Transport` if the input cannot be read.
    fn read_magnet(&mut self, channel: usize) -> Result<bool>;

    /// Drive the solenoid output of one channel.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Transport` if the output cannot be written.
    fn write_lock(&mut self, channel: usize, locked: bool) -> Result<()>;
}
