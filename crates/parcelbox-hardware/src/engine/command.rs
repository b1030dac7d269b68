//! FIFO command/acknowledgement engine.
//!
//! Commands are dispatched one at a time in submission order. The active
//! command resolves with the first inbound line its [`AckMatcher`] accepts,
//! fails with `Protocol` on a device error line, or fails with `Timeout`
//! when its deadline passes. In every case the next command is dispatched
//! on the following [`CommandEngine::dispatch_next`] call.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use parcelbox_core::constants::DEVICE_ERROR_MARKER;
use parcelbox_protocol::{AckMatcher, is_sms_marker};

use crate::controller::deadline_after;
use crate::error::{DeviceError, Result};

/// A command waiting for (or awaiting) its acknowledgement.
#[derive(Debug)]
pub struct PendingCommand {
    pub line: String,
    pub ack: AckMatcher,
    pub timeout: Duration,
    reply: oneshot::Sender<Result<String>>,
}

impl PendingCommand {
    /// Create a command and the receiver of its outcome.
    ///
    /// The outcome is the acknowledgement line that matched.
    pub fn new(
        line: impl Into<String>,
        ack: AckMatcher,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<Result<String>>) {
        let (reply, rx) = oneshot::channel();
        let command = Self {
            line: line.into(),
            ack,
            timeout,
            reply,
        };
        (command, rx)
    }

    /// Resolve the caller. A dropped receiver is not an error.
    pub fn resolve(self, outcome: Result<String>) {
        let _ = self.reply.send(outcome);
    }
}

#[derive(Debug)]
struct ActiveCommand {
    command: PendingCommand,
    deadline: Instant,
}

#[derive(Debug, Default)]
pub struct CommandEngine {
    queue: VecDeque<PendingCommand>,
    active: Option<ActiveCommand>,
}

impl CommandEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, command: PendingCommand) {
        debug!(command = %command.line, queued = self.queue.len(), "Command queued");
        self.queue.push_back(command);
    }

    /// Activate the next queued command if none is active.
    ///
    /// Returns the line the caller must write now. A command whose deadline
    /// cannot be computed fails with `Validation` without being written.
    pub fn dispatch_next(&mut self, now: Instant) -> Option<String> {
        if self.active.is_some() {
            return None;
        }
        loop {
            let command = self.queue.pop_front()?;
            match deadline_after(now, command.timeout) {
                Ok(deadline) => {
                    let line = command.line.clone();
                    self.active = Some(ActiveCommand { deadline, command });
                    return Some(line);
                }
                Err(e) => {
                    warn!(command = %command.line, error = %e, "Command rejected");
                    command.resolve(Err(e));
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Fail the active command, e.g. because its write failed.
    pub fn fail_active(&mut self, error: DeviceError) {
        if let Some(active) = self.active.take() {
            warn!(command = %active.command.line, error = %error, "Command failed");
            active.command.resolve(Err(error));
        }
    }

    /// Offer an inbound line to the active command.
    ///
    /// Returns `true` if the line completed the command.
    pub fn on_line(&mut self, line: &str) -> bool {
        let Some(active) = &self.active else {
            debug!(line = %line, "Unsolicited line discarded");
            return false;
        };

        // A late SMS report is not about the active command.
        if line.contains(DEVICE_ERROR_MARKER) && !is_sms_marker(line) {
            self.fail_active(DeviceError::protocol(line));
            return true;
        }

        if !active.command.ack.matches(line) {
            debug!(line = %line, command = %active.command.line, "Line does not match active command");
            return false;
        }

        if let Some(active) = self.active.take() {
            debug!(command = %active.command.line, ack = %line, "Command acknowledged");
            active.command.resolve(Ok(line.to_string()));
        }
        true
    }

    /// Deadline of the active command.
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|active| active.deadline)
    }

    /// Fail the active command if its deadline has passed.
    pub fn on_timeout(&mut self, now: Instant) {
        let expired = self
            .active
            .as_ref()
            .is_some_and(|active| active.deadline <= now);
        if expired {
            if let Some(active) = self.active.take() {
                warn!(command = %active.command.line, "Command timed out");
                let timeout = active.command.timeout;
                active.command.resolve(Err(DeviceError::timeout(timeout)));
            }
        }
    }

    /// Fail the active command and everything queued behind it.
    pub fn fail_all(&mut self, error: &DeviceError) {
        if let Some(active) = self.active.take() {
            active.command.resolve(Err(error.clone()));
        }
        for command in self.queue.drain(..) {
            command.resolve(Err(error.clone()));
        }
    }
}
