//! Compartment lock supervisor.
//!
//! A single task owns the GPIO bank. It polls every magnet sensor at a fixed
//! interval, publishes a batched [`MagnetState`] whenever at least one
//! reading changed, and drives one unlock/relock sequence per channel:
//!
//! ```text
//! Idle ──unlock──► WaitingForOpen ──door opens──► WaitingForClose ──door closes──► Completed
//!                        │                              │                            │
//!                        └──────── timeout ─────────────┴──────► Expired             ▼
//!                                                                   └─────────────► Idle
//! ```
//!
//! On completion the solenoid is engaged again. On expiry the output is left
//! unlocked so the compartment can still be opened.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use parcelbox_core::MagnetState;

use crate::config::check_timeout;
use crate::controller::{deadline_after, sleep_until_opt};
use crate::error::{DeviceError, Result};
use crate::gpio::AnyGpio;
use crate::observers::Observers;
use crate::traits::GpioBus;

/// Transitions kept per channel for diagnostics.
const MAX_HISTORY_SIZE: usize = 32;

/// Phase of a channel's unlock/relock sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPhase {
    Idle,
    /// Unlocked; waiting for the door to open.
    WaitingForOpen,
    /// Door open; waiting for it to close again.
    WaitingForClose,
    /// Door closed and solenoid re-engaged.
    Completed,
    /// Timed out or aborted with the output left unlocked.
    Expired,
}

impl fmt::Display for LockPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockPhase::Idle => "Idle",
            LockPhase::WaitingForOpen => "WaitingForOpen",
            LockPhase::WaitingForClose => "WaitingForClose",
            LockPhase::Completed => "Completed",
            LockPhase::Expired => "Expired",
        };
        f.write_str(name)
    }
}

impl LockPhase {
    /// Check if a transition to `target` is valid.
    ///
    /// ```
    /// use parcelbox_hardware::LockPhase;
    ///
    /// assert!(LockPhase::Idle.can_transition_to(&LockPhase::WaitingForOpen));
    /// assert!(!LockPhase::Idle.can_transition_to(&LockPhase::Completed));
    /// ```
    #[must_use]
    pub fn can_transition_to(&self, target: &LockPhase) -> bool {
        use LockPhase::*;

        matches!(
            (self, target),
            (Idle, WaitingForOpen)
                | (WaitingForOpen, WaitingForClose)
                | (WaitingForOpen, Expired)
                | (WaitingForClose, Completed)
                | (WaitingForClose, Expired)
                | (Completed, Idle)
                | (Expired, Idle)
        )
    }

    /// A sequence is running in this phase.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(self, LockPhase::WaitingForOpen | LockPhase::WaitingForClose)
    }
}

/// One recorded phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: LockPhase,
    pub to: LockPhase,
    pub at: Instant,
}

/// Phase and recent transitions of one lock channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub phase: LockPhase,
    pub history: Vec<PhaseTransition>,
}

/// Work handed to the supervisor by the facade.
#[derive(Debug)]
pub(crate) enum LockRequest {
    Unlock {
        channel: usize,
        timeout: Duration,
        reply: oneshot::Sender<Result<()>>,
    },
    Inspect {
        channel: usize,
        reply: oneshot::Sender<Option<LockStatus>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
struct Sequence {
    deadline: Instant,
    timeout: Duration,
    reply: oneshot::Sender<Result<()>>,
}

#[derive(Debug)]
struct ChannelSlot {
    phase: LockPhase,
    history: VecDeque<PhaseTransition>,
    sequence: Option<Sequence>,
}

impl ChannelSlot {
    fn new() -> Self {
        Self {
            phase: LockPhase::Idle,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            sequence: None,
        }
    }

    fn transition(&mut self, channel: usize, to: LockPhase) {
        if !self.phase.can_transition_to(&to) {
            warn!(channel, from = %self.phase, to = %to, "Rejected lock phase transition");
            return;
        }

        debug!(channel, from = %self.phase, to = %to, "Lock phase transition");
        self.history.push_back(PhaseTransition {
            from: self.phase,
            to,
            at: Instant::now(),
        });
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.phase = to;
    }

    /// Leave a terminal phase, resolving the caller with `outcome`.
    fn finish(&mut self, channel: usize, terminal: LockPhase, outcome: Result<()>) {
        self.transition(channel, terminal);
        self.transition(channel, LockPhase::Idle);
        if let Some(sequence) = self.sequence.take() {
            let _ = sequence.reply.send(outcome);
        }
    }

    fn status(&self) -> LockStatus {
        LockStatus {
            phase: self.phase,
            history: self.history.iter().copied().collect(),
        }
    }
}

pub(crate) struct LockSupervisor {
    gpio: AnyGpio,
    slots: Vec<ChannelSlot>,
    readings: MagnetState,
    poll_interval: Duration,
    requests: mpsc::Receiver<LockRequest>,
    magnets: watch::Sender<MagnetState>,
    observers: Observers<MagnetState>,
}

impl LockSupervisor {
    pub(crate) fn new(
        gpio: AnyGpio,
        poll_interval: Duration,
        requests: mpsc::Receiver<LockRequest>,
        magnets: watch::Sender<MagnetState>,
        observers: Observers<MagnetState>,
    ) -> Self {
        let channels = gpio.channel_count();
        Self {
            gpio,
            slots: (0..channels).map(|_| ChannelSlot::new()).collect(),
            readings: MagnetState::all_closed(channels),
            poll_interval,
            requests,
            magnets,
            observers,
        }
    }

    pub(crate) async fn run(mut self) {
        // Baseline; not reported to observers.
        let baseline = (0..self.slots.len())
            .map(|channel| self.gpio.read_magnet(channel).unwrap_or(false))
            .collect();
        self.readings = MagnetState::new(baseline);
        self.magnets.send_replace(self.readings.clone());

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(channels = self.slots.len(), "Lock supervisor started");

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(LockRequest::Unlock { channel, timeout, reply }) => {
                        self.start_sequence(channel, timeout, reply);
                    }
                    Some(LockRequest::Inspect { channel, reply }) => {
                        let _ = reply.send(self.slots.get(channel).map(ChannelSlot::status));
                    }
                    Some(LockRequest::Shutdown { reply }) => {
                        self.expire_all(&DeviceError::NotConnected);
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.expire_all(&DeviceError::NotConnected);
                        break;
                    }
                },
                _ = ticker.tick() => self.poll(),
                () = sleep_until_opt(deadline) => self.expire_due(Instant::now()),
            }
        }

        info!("Lock supervisor stopped");
    }

    fn start_sequence(&mut self, channel: usize, timeout: Duration, reply: oneshot::Sender<Result<()>>) {
        let deadline = match self.begin(channel, timeout) {
            Ok(deadline) => deadline,
            Err(e) => {
                warn!(channel, error = %e, "Unlock rejected");
                let _ = reply.send(Err(e));
                return;
            }
        };

        if let Some(slot) = self.slots.get_mut(channel) {
            slot.transition(channel, LockPhase::WaitingForOpen);
            slot.sequence = Some(Sequence {
                deadline,
                timeout,
                reply,
            });
        }
        info!(channel, timeout = ?timeout, "Compartment unlocked, waiting for the door");
    }

    /// Check the preconditions and release the solenoid.
    ///
    /// Returns the relock deadline. Nothing is written unless every check
    /// passed.
    fn begin(&mut self, channel: usize, timeout: Duration) -> Result<Instant> {
        let slot = self.slots.get(channel).ok_or_else(|| {
            DeviceError::validation(format!("lock channel {channel} does not exist"))
        })?;
        if slot.phase.is_waiting() {
            return Err(DeviceError::sequence_conflict(channel));
        }
        check_timeout("relock timeout", timeout)?;
        let deadline = deadline_after(Instant::now(), timeout)?;

        if !self.gpio.read_magnet(channel)? {
            return Err(DeviceError::precondition(format!(
                "door on channel {channel} is not closed"
            )));
        }
        self.record_reading(channel, true);

        self.gpio.write_lock(channel, false)?;
        Ok(deadline)
    }

    /// Update one reading outside the poll cycle.
    fn record_reading(&mut self, channel: usize, closed: bool) {
        if self.readings.is_closed(channel) == Some(closed) {
            return;
        }
        let mut readings = self.readings.readings().to_vec();
        readings[channel] = closed;
        self.publish(MagnetState::new(readings));
    }

    fn publish(&mut self, readings: MagnetState) {
        self.readings = readings.clone();
        self.magnets.send_replace(readings.clone());
        self.observers.notify(&readings);
    }

    fn poll(&mut self) {
        let mut next = self.readings.readings().to_vec();
        for (channel, reading) in next.iter_mut().enumerate() {
            match self.gpio.read_magnet(channel) {
                Ok(closed) => *reading = closed,
                Err(e) => warn!(channel, error = %e, "Magnet read failed, keeping last reading"),
            }
        }

        let next = MagnetState::new(next);
        let changed = next.changed_channels(&self.readings);
        if changed.is_empty() {
            return;
        }

        debug!(changed = ?changed, readings = ?next.readings(), "Magnet state changed");
        self.publish(next);

        for channel in changed {
            if let Some(closed) = self.readings.is_closed(channel) {
                self.advance(channel, closed);
            }
        }
    }

    fn advance(&mut self, channel: usize, closed: bool) {
        let Some(phase) = self.slots.get(channel).map(|slot| slot.phase) else {
            return;
        };

        match (phase, closed) {
            (LockPhase::WaitingForOpen, false) => {
                info!(channel, "Door opened");
                self.slots[channel].transition(channel, LockPhase::WaitingForClose);
            }
            (LockPhase::WaitingForClose, true) => {
                let outcome = self.gpio.write_lock(channel, true);
                match &outcome {
                    Ok(()) => info!(channel, "Door closed, compartment relocked"),
                    Err(e) => warn!(channel, error = %e, "Door closed but relock failed, output state uncertain"),
                }
                self.slots[channel].finish(channel, LockPhase::Completed, outcome);
            }
            _ => {}
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|slot| slot.sequence.as_ref().map(|sequence| sequence.deadline))
            .min()
    }

    fn expire_due(&mut self, now: Instant) {
        for (channel, slot) in self.slots.iter_mut().enumerate() {
            let Some(timeout) = slot
                .sequence
                .as_ref()
                .filter(|sequence| sequence.deadline <= now)
                .map(|sequence| sequence.timeout)
            else {
                continue;
            };

            warn!(channel, "Relock timed out, compartment left unlocked");
            slot.finish(channel, LockPhase::Expired, Err(DeviceError::timeout(timeout)));
        }
    }

    fn expire_all(&mut self, error: &DeviceError) {
        for (channel, slot) in self.slots.iter_mut().enumerate() {
            if slot.phase.is_waiting() {
                warn!(channel, error = %error, "Aborting lock sequence, compartment left unlocked");
                slot.finish(channel, LockPhase::Expired, Err(error.clone()));
            }
        }
    }
}
