//! The bridge controller task.
//!
//! One task owns the link, the command engine, the SMS queue and the
//! telemetry decoder. It reacts to facade requests, inbound link events and
//! its own deadlines one at a time, so none of that state needs locking.
//!
//! ```text
//!  Device facade ──requests──► ┌────────────┐ ◄──LinkEvent── reader
//!                              │ Controller │
//!  watch: snapshot/mode/ready ◄┤            ├──write_line──► link
//!                              └────────────┘
//! ```

use std::future::pending;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use parcelbox_core::{SensorSnapshot, SnapshotOrigin, TransportMode};
use parcelbox_protocol::{InboundLine, classify};

use crate::config::{DeviceConfig, ProbeFailurePolicy};
use crate::engine::{CommandEngine, PendingCommand, SmsJob, SmsQueue};
use crate::error::{DeviceError, Result};
use crate::link::{AnyLinkWriter, LinkEvent, OpenedLink, TransportSelector};
use crate::observers::Observers;
use crate::traits::LinkWriter;

/// Work handed to the controller by the facade.
#[derive(Debug)]
pub(crate) enum ControlRequest {
    /// Command that waits for an acknowledgement.
    Command(PendingCommand),
    /// Fire-and-forget line (servo writes).
    Servo { line: String },
    Sms(SmsJob),
    ForceMock { reply: oneshot::Sender<TransportMode> },
    Close { reply: oneshot::Sender<()> },
}

/// Publishing side of the state the facade reads.
#[derive(Debug)]
pub(crate) struct ControllerOutputs {
    pub snapshot: watch::Sender<SensorSnapshot>,
    pub mode: watch::Sender<TransportMode>,
    pub ready: watch::Sender<bool>,
    pub fatal: watch::Sender<Option<DeviceError>>,
    pub sensor_observers: Observers<SensorSnapshot>,
}

struct ActiveLink {
    writer: AnyLinkWriter,
    events: mpsc::Receiver<LinkEvent>,
    mode: TransportMode,
}

pub(crate) struct Controller {
    config: DeviceConfig,
    selector: TransportSelector,
    link: Option<ActiveLink>,
    commands: CommandEngine,
    sms: SmsQueue,
    requests: mpsc::Receiver<ControlRequest>,
    outputs: ControllerOutputs,
    /// A real link has proven itself by sending at least one line.
    healthy: bool,
    /// The current link is the single reconnect attempt after losing a
    /// healthy one and has not proven itself yet.
    reconnected: bool,
    probe_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl Controller {
    pub(crate) fn new(
        config: DeviceConfig,
        selector: TransportSelector,
        requests: mpsc::Receiver<ControlRequest>,
        outputs: ControllerOutputs,
    ) -> Self {
        Self {
            sms: SmsQueue::new(config.sms_timeout),
            config,
            selector,
            link: None,
            commands: CommandEngine::new(),
            requests,
            outputs,
            healthy: false,
            reconnected: false,
            probe_deadline: None,
            reconnect_at: None,
        }
    }

    /// Open the initial link, report its mode on `started`, then serve.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::LinkLost` when the controller gives up on the
    /// bridge. The same error is published on the fatal channel first.
    pub(crate) async fn run(mut self, started: oneshot::Sender<TransportMode>) -> Result<()> {
        let opened = self.selector.open().await;
        self.install(opened);
        let _ = started.send(self.mode());

        loop {
            self.pump().await;

            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(ControlRequest::Close { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        return Ok(());
                    }
                    Some(request) => self.handle_request(request).await,
                    None => {
                        self.shutdown();
                        return Ok(());
                    }
                },
                event = next_event(&mut self.link) => self.handle_event(event)?,
                () = sleep_until_opt(self.commands.deadline()) => {
                    self.commands.on_timeout(Instant::now());
                }
                () = sleep_until_opt(self.sms.deadline()) => {
                    self.sms.on_timeout(Instant::now());
                }
                () = sleep_until_opt(self.probe_deadline) => self.on_probe_failed("no data from bridge")?,
                () = sleep_until_opt(self.reconnect_at) => self.reconnect().await?,
            }
        }
    }

    fn mode(&self) -> TransportMode {
        self.link
            .as_ref()
            .map_or(TransportMode::Disconnected, |link| link.mode)
    }

    fn install(&mut self, opened: OpenedLink) {
        let mode = opened.mode;
        self.link = Some(ActiveLink {
            writer: opened.writer,
            events: opened.events,
            mode,
        });
        self.reconnect_at = None;
        self.probe_deadline = None;
        self.healthy = false;
        self.reconnected = false;

        if mode.is_real() {
            match self.config.liveness_probe {
                Some(window) => match deadline_after(Instant::now(), window) {
                    Ok(deadline) => self.probe_deadline = Some(deadline),
                    Err(e) => {
                        warn!(error = %e, "Liveness probe disabled");
                        self.healthy = true;
                    }
                },
                None => self.healthy = true,
            }
        }

        self.outputs.mode.send_replace(mode);
        self.outputs.ready.send_replace(mode == TransportMode::Mock);
        info!(mode = %mode, "Bridge link installed");
    }

    /// Drop the current link and fail everything that depended on it.
    fn detach(&mut self) -> Option<ActiveLink> {
        let link = self.link.take()?;
        self.probe_deadline = None;
        self.commands.fail_all(&DeviceError::NotConnected);
        self.sms.on_disconnect(self.config.sms_retention);
        self.outputs.ready.send_replace(false);
        self.outputs.mode.send_replace(TransportMode::Disconnected);
        Some(link)
    }

    /// Write every line the engines want to send now.
    async fn pump(&mut self) {
        loop {
            let Some(link) = self.link.as_mut() else {
                return;
            };
            let now = Instant::now();

            if let Some(line) = self.commands.dispatch_next(now) {
                if let Err(e) = link.writer.write_line(&line).await {
                    self.commands.fail_active(e);
                }
                continue;
            }

            if let Some(line) = self.sms.dispatch_next(now) {
                if let Err(e) = link.writer.write_line(&line).await {
                    self.sms.fail_in_flight(e);
                }
                continue;
            }

            return;
        }
    }

    async fn handle_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Command(command) => {
                if self.link.is_some() {
                    self.commands.submit(command);
                } else {
                    command.resolve(Err(DeviceError::NotConnected));
                }
            }
            ControlRequest::Servo { line } => match self.link.as_mut() {
                Some(link) => {
                    if let Err(e) = link.writer.write_line(&line).await {
                        warn!(line = %line, error = %e, "Servo write failed");
                    }
                }
                None => debug!(line = %line, "Servo write dropped, no link"),
            },
            ControlRequest::Sms(job) => {
                if self.link.is_some() {
                    self.sms.enqueue(job);
                } else {
                    job.resolve(Err(DeviceError::NotConnected));
                }
            }
            ControlRequest::ForceMock { reply } => {
                if self.mode() != TransportMode::Mock {
                    if let Some(link) = self.detach() {
                        info!(mode = %link.mode, "Leaving link for mock mode");
                    }
                    let opened = self.selector.open_mock();
                    self.install(opened);
                }
                let _ = reply.send(self.mode());
            }
            // Handled by the run loop.
            ControlRequest::Close { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_event(&mut self, event: LinkEvent) -> Result<()> {
        match event {
            LinkEvent::Line(line) => {
                self.on_line(&line);
                Ok(())
            }
            LinkEvent::Closed => self.on_link_down("link closed"),
            LinkEvent::Error(reason) => self.on_link_down(&reason),
        }
    }

    fn on_line(&mut self, line: &str) {
        if self.probe_deadline.take().is_some() {
            info!("Bridge link is alive");
        }
        if self.mode().is_real() {
            self.healthy = true;
            self.reconnected = false;
        }

        let origin = if self.mode().is_real() {
            SnapshotOrigin::Device
        } else {
            SnapshotOrigin::Synthetic
        };

        match classify(line, self.sms.is_in_flight(), origin) {
            InboundLine::Empty => {}
            InboundLine::SmsSent => self.sms.complete(Ok(())),
            InboundLine::SmsFailed(text) => self.sms.complete(Err(DeviceError::protocol(text))),
            InboundLine::Telemetry(snapshot) => {
                self.outputs.snapshot.send_replace(snapshot.clone());
                self.outputs.sensor_observers.notify(&snapshot);
            }
            InboundLine::MalformedTelemetry(reason) => {
                debug!(line = %line, reason = %reason, "Dropping malformed telemetry");
            }
            InboundLine::Candidate { text, ready } => {
                if ready && !self.outputs.ready.send_replace(true) {
                    info!("Bridge reported ready");
                }
                self.commands.on_line(&text);
            }
        }
    }

    fn on_link_down(&mut self, reason: &str) -> Result<()> {
        let was_healthy = self.healthy;
        self.healthy = false;
        let Some(link) = self.detach() else {
            return Ok(());
        };

        match link.mode {
            TransportMode::Real if was_healthy => {
                warn!(
                    reason = %reason,
                    delay = ?self.config.reconnect_delay,
                    "Bridge link lost, scheduling one reconnect attempt"
                );
                let now = Instant::now();
                self.reconnect_at =
                    Some(deadline_after(now, self.config.reconnect_delay).unwrap_or(now));
                Ok(())
            }
            TransportMode::Real => self.on_probe_failed(reason),
            TransportMode::Mock | TransportMode::Disconnected => {
                warn!(reason = %reason, "Synthetic link stopped, restarting it");
                let opened = self.selector.open_mock();
                self.install(opened);
                Ok(())
            }
        }
    }

    /// A real link never proved itself alive.
    ///
    /// After a lost healthy link this ends the controller whatever the
    /// policy says: the reconnect attempt has been used up.
    fn on_probe_failed(&mut self, reason: &str) -> Result<()> {
        self.probe_deadline = None;
        let reconnected = std::mem::take(&mut self.reconnected);
        self.detach();

        if reconnected {
            return self.go_fatal(DeviceError::link_lost(format!(
                "reconnected bridge unresponsive: {reason}"
            )));
        }

        match self.config.probe_failure {
            ProbeFailurePolicy::FallBackToMock => {
                warn!(reason = %reason, "Bridge unresponsive, entering mock mode");
                let opened = self.selector.open_mock();
                self.install(opened);
                Ok(())
            }
            ProbeFailurePolicy::Terminate => {
                self.go_fatal(DeviceError::link_lost(format!("bridge unresponsive: {reason}")))
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnect_at = None;
        info!("Reconnecting to bridge");

        match self.selector.open_real().await {
            Ok(opened) => {
                info!("Bridge link re-established");
                self.install(opened);
                self.reconnected = self.link.as_ref().is_some_and(|link| link.mode.is_real())
                    && !self.healthy;
                Ok(())
            }
            Err(e) => self.go_fatal(DeviceError::link_lost(format!("reconnect failed: {e}"))),
        }
    }

    fn go_fatal(&mut self, error: DeviceError) -> Result<()> {
        error!(error = %error, "Bridge link lost for good");
        self.detach();
        self.sms.fail_all(&DeviceError::NotConnected);
        self.outputs.mode.send_replace(TransportMode::Disconnected);
        self.outputs.fatal.send_replace(Some(error.clone()));
        Err(error)
    }

    fn shutdown(&mut self) {
        self.detach();
        self.reconnect_at = None;
        self.sms.fail_all(&DeviceError::NotConnected);
        self.outputs.mode.send_replace(TransportMode::Disconnected);
        info!("Device controller closed");
    }
}

async fn next_event(link: &mut Option<ActiveLink>) -> LinkEvent {
    match link {
        Some(link) => link.events.recv().await.unwrap_or(LinkEvent::Closed),
        None => pending().await,
    }
}

/// `now + timeout`, or `Validation` when that instant cannot be represented.
pub(crate) fn deadline_after(now: Instant, timeout: Duration) -> Result<Instant> {
    now.checked_add(timeout).ok_or_else(|| {
        DeviceError::validation(format!("timeout of {timeout:?} is out of range"))
    })
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
