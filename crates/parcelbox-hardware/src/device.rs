//! The device facade used by the kiosk application.
//!
//! [`Device`] is a cheap, cloneable handle. It holds request senders to the
//! controller and lock supervisor tasks plus `watch` receivers for the state
//! they publish, so reads such as [`Device::get_sensor_snapshot`] never wait.
//!
//! # Examples
//!
//! ```no_run
//! use parcelbox_core::TareTarget;
//! use parcelbox_hardware::{Device, DeviceConfig};
//!
//! #[tokio::main]
//! async fn main() -> parcelbox_hardware::Result<()> {
//!     let device = Device::start(DeviceConfig::default()).await?;
//!     println!("mode: {}", device.get_mode());
//!
//!     device.tare(TareTarget::All).await?;
//!     let snapshot = device.get_sensor_snapshot();
//!     println!("weights: {:?}", snapshot.weights);
//!
//!     device.unlock_and_wait(0, None).await?;
//!     device.close().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use parcelbox_core::constants::WEIGH_CHANNEL_COUNT;
use parcelbox_core::{
    MagnetState, PhoneNumber, SensorSnapshot, SmsBody, TareTarget, TransportMode, WeighChannel,
};
use parcelbox_protocol::{AckMatcher, DeviceCommand, parse_calibration_reply, servo_value_for_speed};

use crate::config::{DeviceConfig, check_timeout};
use crate::controller::{ControlRequest, Controller, ControllerOutputs};
use crate::engine::{PendingCommand, SmsJob};
use crate::error::{DeviceError, Result};
use crate::gpio::{AnyGpio, MockGpio};
use crate::link::{LinkTarget, MockLinkHandle, TransportSelector};
use crate::lock::{LockRequest, LockStatus, LockSupervisor};
use crate::observers::{ObserverId, Observers};
use crate::traits::GpioBus;

const REQUEST_CAPACITY: usize = 64;

/// Assembles and starts a [`Device`].
#[derive(Debug)]
pub struct DeviceBuilder {
    config: DeviceConfig,
    link_target: Option<LinkTarget>,
    gpio: Option<AnyGpio>,
    mock_handles: Option<mpsc::UnboundedSender<MockLinkHandle>>,
}

impl DeviceBuilder {
    /// Where real links come from. Defaults to the configured serial port.
    #[must_use]
    pub fn link_target(mut self, target: LinkTarget) -> Self {
        self.link_target = Some(target);
        self
    }

    /// GPIO bank for the locks. Defaults to a mock bank sized from the config.
    #[must_use]
    pub fn gpio(mut self, gpio: AnyGpio) -> Self {
        self.gpio = Some(gpio);
        self
    }

    /// Receive the handle of every synthetic link the device starts.
    #[must_use]
    pub fn mock_handles(mut self, handles: mpsc::UnboundedSender<MockLinkHandle>) -> Self {
        self.mock_handles = Some(handles);
        self
    }

    /// Spawn the controller and lock supervisor tasks.
    ///
    /// Resolves once the initial link (real or synthetic) is in place.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Validation` for an invalid configuration, or
    /// `DeviceError::NotConnected` if the controller stops during start-up.
    pub async fn start(self) -> Result<Device> {
        let config = self.config;
        config.validate()?;

        let gpio = self
            .gpio
            .unwrap_or_else(|| AnyGpio::Mock(MockGpio::new(config.lock.channels).0));
        let target = self
            .link_target
            .unwrap_or_else(|| LinkTarget::Serial(config.serial.clone()));
        let mut selector = TransportSelector::new(target, config.mock_link_config());
        if let Some(handles) = self.mock_handles {
            selector = selector.with_mock_handles(handles);
        }

        let (request_tx, request_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (lock_tx, lock_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (snapshot_tx, snapshot) = watch::channel(SensorSnapshot::empty());
        let (mode_tx, mode) = watch::channel(TransportMode::Disconnected);
        let (ready_tx, ready) = watch::channel(false);
        let (fatal_tx, fatal) = watch::channel(None);
        let (magnets_tx, magnets) = watch::channel(MagnetState::all_closed(gpio.channel_count()));
        let sensor_observers = Observers::new();
        let magnet_observers = Observers::new();

        let supervisor = LockSupervisor::new(
            gpio,
            config.lock.poll_interval,
            lock_rx,
            magnets_tx,
            magnet_observers.clone(),
        );
        tokio::spawn(supervisor.run());

        let controller = Controller::new(
            config.clone(),
            selector,
            request_rx,
            ControllerOutputs {
                snapshot: snapshot_tx,
                mode: mode_tx,
                ready: ready_tx,
                fatal: fatal_tx,
                sensor_observers: sensor_observers.clone(),
            },
        );
        let (started_tx, started_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(e) = controller.run(started_tx).await {
                error!(error = %e, "Device controller stopped");
            }
        });

        let mode_at_start = started_rx.await.map_err(|_| DeviceError::NotConnected)?;
        info!(mode = %mode_at_start, "Device started");

        Ok(Device {
            config,
            requests: request_tx,
            locks: lock_tx,
            snapshot,
            mode,
            ready,
            fatal,
            magnets,
            sensor_observers,
            magnet_observers,
        })
    }
}

/// Handle to the running device controller.
#[derive(Debug, Clone)]
pub struct Device {
    config: DeviceConfig,
    requests: mpsc::Sender<ControlRequest>,
    locks: mpsc::Sender<LockRequest>,
    snapshot: watch::Receiver<SensorSnapshot>,
    mode: watch::Receiver<TransportMode>,
    ready: watch::Receiver<bool>,
    fatal: watch::Receiver<Option<DeviceError>>,
    magnets: watch::Receiver<MagnetState>,
    sensor_observers: Observers<SensorSnapshot>,
    magnet_observers: Observers<MagnetState>,
}

impl Device {
    #[must_use]
    pub fn builder(config: DeviceConfig) -> DeviceBuilder {
        DeviceBuilder {
            config,
            link_target: None,
            gpio: None,
            mock_handles: None,
        }
    }

    /// Start with the configured serial port and a mock GPIO bank.
    ///
    /// # Errors
    ///
    /// See [`DeviceBuilder::start`].
    pub async fn start(config: DeviceConfig) -> Result<Self> {
        Self::builder(config).start().await
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Latest sensor frame. Never blocks.
    pub fn get_sensor_snapshot(&self) -> SensorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn get_mode(&self) -> TransportMode {
        *self.mode.borrow()
    }

    /// The bridge announced itself (always set in mock mode).
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Last published magnet readings, one per lock channel.
    pub fn magnet_state(&self) -> MagnetState {
        self.magnets.borrow().clone()
    }

    /// Set a continuous servo's speed (-100..=100, clamped).
    ///
    /// Fire-and-forget: returns whether the write was accepted for sending.
    pub fn set_servo_speed(&self, channel: u8, speed: i32) -> bool {
        let Ok(channel) = WeighChannel::new(channel) else {
            return false;
        };
        if !self.get_mode().is_connected() {
            return false;
        }

        let command = DeviceCommand::Servo {
            channel,
            value: servo_value_for_speed(speed),
        };
        self.requests
            .try_send(ControlRequest::Servo {
                line: command.encode(),
            })
            .is_ok()
    }

    /// Set all four servos at once, channel 1 first.
    pub fn set_all_servo_speeds(&self, speeds: &[i32]) -> bool {
        if speeds.len() != WEIGH_CHANNEL_COUNT {
            return false;
        }
        (1u8..)
            .zip(speeds)
            .map(|(channel, speed)| self.set_servo_speed(channel, *speed))
            .fold(true, |all, accepted| all && accepted)
    }

    /// Zero one load cell or all of them.
    ///
    /// # Errors
    ///
    /// Fails with the command engine's error (`Timeout`, `Protocol`,
    /// `Transport`, `NotConnected`).
    pub async fn tare(&self, target: TareTarget) -> Result<()> {
        self.send_command(&DeviceCommand::Tare(target), None)
            .await
            .map(|_| ())
    }

    /// Store a calibration factor for a load cell (channel 1..=4).
    ///
    /// # Errors
    ///
    /// `Validation` for a bad channel or a non-finite value, otherwise as
    /// [`Device::tare`].
    pub async fn set_calibration(&self, channel: u8, value: f64) -> Result<()> {
        let channel = WeighChannel::new(channel)?;
        if !value.is_finite() {
            return Err(DeviceError::validation(format!(
                "calibration value must be finite, got {value}"
            )));
        }
        self.send_command(&DeviceCommand::SetCalibration { channel, value }, None)
            .await
            .map(|_| ())
    }

    /// Read a calibration factor back from the bridge.
    ///
    /// # Errors
    ///
    /// As [`Device::set_calibration`], plus `Protocol` for an unreadable reply.
    pub async fn get_calibration(&self, channel: u8) -> Result<f64> {
        let channel = WeighChannel::new(channel)?;
        let reply = self
            .send_command(&DeviceCommand::GetCalibration(channel), None)
            .await?;
        let (_, value) = parse_calibration_reply(&reply)?;
        Ok(value)
    }

    /// Send a command and wait for its acknowledgement line.
    ///
    /// # Errors
    ///
    /// `Validation` for commands without an acknowledgement (servo, SMS).
    pub async fn send_command(
        &self,
        command: &DeviceCommand,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let ack = command.ack().ok_or_else(|| {
            DeviceError::validation(format!("{} does not take an acknowledgement", command.kind()))
        })?;
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        self.send_line(command.encode(), ack, timeout).await
    }

    /// Send a raw line and wait for the first line `ack` accepts.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty line or one containing a line break;
    /// `NotConnected` without a link; otherwise the engine's outcome.
    pub async fn send_line(
        &self,
        line: impl Into<String>,
        ack: AckMatcher,
        timeout: Duration,
    ) -> Result<String> {
        let line = line.into();
        if line.trim().is_empty() || line.contains(['\r', '\n']) {
            return Err(DeviceError::validation(format!("invalid command line {line:?}")));
        }
        check_timeout("command timeout", timeout)?;
        if !self.get_mode().is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let (command, outcome) = PendingCommand::new(line, ack, timeout);
        self.requests
            .send(ControlRequest::Command(command))
            .await
            .map_err(|_| DeviceError::NotConnected)?;
        outcome.await.map_err(|_| DeviceError::NotConnected)?
    }

    /// Queue an SMS and wait until the modem reports the outcome.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad number or body, `NotConnected` without a link,
    /// `Protocol` when the modem reports failure and `Timeout` when it never
    /// reports.
    pub async fn send_sms(&self, number: &str, body: &str) -> Result<()> {
        let number = PhoneNumber::new(number)?;
        let body = SmsBody::new(body)?;
        if !self.get_mode().is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let (job, outcome) = SmsJob::new(number, body);
        self.requests
            .send(ControlRequest::Sms(job))
            .await
            .map_err(|_| DeviceError::NotConnected)?;
        outcome.await.map_err(|_| DeviceError::NotConnected)?
    }

    /// Unlock a compartment and wait until its door has opened and closed.
    ///
    /// Dropping the future does not cancel the sequence.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero or out-of-range timeout, `SequenceConflict` if
    /// the channel is mid-sequence, `Precondition` if its door is not closed,
    /// `Transport` on GPIO failure and `Timeout` when the door cycle does not
    /// finish in time (the compartment then stays unlocked).
    pub async fn unlock_and_wait(&self, channel: usize, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.config.lock.relock_timeout);
        check_timeout("relock timeout", timeout)?;

        let (reply, outcome) = oneshot::channel();
        self.locks
            .send(LockRequest::Unlock {
                channel,
                timeout,
                reply,
            })
            .await
            .map_err(|_| DeviceError::NotConnected)?;
        outcome.await.map_err(|_| DeviceError::NotConnected)?
    }

    /// Callback form of [`Device::unlock_and_wait`].
    ///
    /// The request is submitted before this returns, so two calls are seen by
    /// the supervisor in call order. Exactly one callback runs.
    pub fn unlock_and_wait_for_relock<R, E>(
        &self,
        channel: usize,
        on_relock: R,
        on_expired: E,
        timeout: Option<Duration>,
    ) -> JoinHandle<()>
    where
        R: FnOnce() + Send + 'static,
        E: FnOnce(DeviceError) + Send + 'static,
    {
        let timeout = timeout.unwrap_or(self.config.lock.relock_timeout);
        let (reply, outcome) = oneshot::channel();
        let submitted = check_timeout("relock timeout", timeout).and_then(|()| {
            self.locks
                .try_send(LockRequest::Unlock {
                    channel,
                    timeout,
                    reply,
                })
                .map_err(|_| DeviceError::NotConnected)
        });

        tokio::spawn(async move {
            let result = match submitted {
                Ok(()) => outcome.await.unwrap_or(Err(DeviceError::NotConnected)),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => on_relock(),
                Err(e) => on_expired(e),
            }
        })
    }

    /// Phase and recent transitions of a lock channel.
    ///
    /// # Errors
    ///
    /// `Validation` for an unknown channel, `NotConnected` after shutdown.
    pub async fn lock_status(&self, channel: usize) -> Result<LockStatus> {
        let (reply, status) = oneshot::channel();
        self.locks
            .send(LockRequest::Inspect { channel, reply })
            .await
            .map_err(|_| DeviceError::NotConnected)?;
        status
            .await
            .map_err(|_| DeviceError::NotConnected)?
            .ok_or_else(|| DeviceError::validation(format!("lock channel {channel} does not exist")))
    }

    /// Drop the current link and run on synthetic data.
    ///
    /// # Errors
    ///
    /// `NotConnected` if the controller has stopped.
    pub async fn force_mock_mode(&self) -> Result<TransportMode> {
        let (reply, mode) = oneshot::channel();
        self.requests
            .send(ControlRequest::ForceMock { reply })
            .await
            .map_err(|_| DeviceError::NotConnected)?;
        mode.await.map_err(|_| DeviceError::NotConnected)
    }

    /// Stop both tasks. Pending operations fail with `NotConnected` and
    /// running lock sequences expire with their compartments unlocked.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self.requests.send(ControlRequest::Close { reply }).await.is_ok() {
            let _ = done.await;
        }

        let (reply, done) = oneshot::channel();
        if self.locks.send(LockRequest::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Resolves when the controller hits an unrecoverable fault.
    ///
    /// Returns `None` if the controller stopped normally instead.
    pub async fn fatal(&self) -> Option<DeviceError> {
        let mut fatal = self.fatal.clone();
        fatal
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|error| error.clone())
    }

    /// Observe every sensor frame, in arrival order.
    pub fn subscribe_sensor<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SensorSnapshot) + Send + Sync + 'static,
    {
        self.sensor_observers.register(observer)
    }

    pub fn unsubscribe_sensor(&self, id: ObserverId) -> bool {
        self.sensor_observers.unregister(id)
    }

    /// Observe batched magnet changes.
    pub fn subscribe_magnets<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&MagnetState) + Send + Sync + 'static,
    {
        self.magnet_observers.register(observer)
    }

    pub fn unsubscribe_magnets(&self, id: ObserverId) -> bool {
        self.magnet_observers.unregister(id)
    }
}
