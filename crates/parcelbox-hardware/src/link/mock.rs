//! Synthetic bridge link for development and testing.
//!
//! A [`MockLink`] behaves like the bridge firmware: it emits random telemetry
//! frames at a fixed interval and answers tare, calibration and SMS commands.
//! The paired [`MockLinkHandle`] lets tests inject lines, observe writes,
//! force write failures and simulate a dropped cable.
//!
//! # Examples
//!
//! ```
//! use parcelbox_hardware::link::{MockLink, MockLinkConfig};
//! use parcelbox_hardware::traits::LinkWriter;
//! use parcelbox_hardware::LinkEvent;
//!
//! #[tokio::main]
//! async fn main() -> parcelbox_hardware::Result<()> {
//!     let config = MockLinkConfig { telemetry_interval: None, ..Default::default() };
//!     let (link, mut handle) = MockLink::new(config);
//!     let mut opened = link.start();
//!
//!     opened.writer.write_line("TARE:2").await?;
//!     assert_eq!(handle.next_written().await.as_deref(), Some("TARE:2"));
//!     assert_eq!(opened.events.recv().await, Some(LinkEvent::Line("ACK:TARE:2".into())));
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use parcelbox_core::constants::{
    ACK_PREFIX, CALIBRATION_GET_PREFIX, CALIBRATION_SET_PREFIX, FIELD_DELIMITER,
    MOCK_DEFAULT_CALIBRATION, MOCK_INFRARED_MAX, MOCK_TELEMETRY_INTERVAL_MS,
    MOCK_WEIGHT_MAX_GRAMS, SERVO_PREFIX, SMS_PREFIX, SMS_SUCCESS_MARKER, TARE_PREFIX,
    WEIGH_CHANNEL_COUNT,
};
use parcelbox_core::TransportMode;
use parcelbox_protocol::TelemetryFrame;

use super::{AnyLinkWriter, LINK_EVENT_CAPACITY, LinkEvent, OpenedLink};
use crate::error::{DeviceError, Result};
use crate::traits::LinkWriter;

/// Behaviour of a synthetic link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLinkConfig {
    /// Period of synthetic telemetry frames, `None` to disable them.
    pub telemetry_interval: Option<Duration>,
    /// Answer commands the way the firmware does.
    pub auto_reply: bool,
    /// Mode reported for this link. Tests use `Real` to stand in for hardware.
    pub presented_mode: TransportMode,
}

impl Default for MockLinkConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: Some(Duration::from_millis(MOCK_TELEMETRY_INTERVAL_MS)),
            auto_reply: true,
            presented_mode: TransportMode::Mock,
        }
    }
}

impl MockLinkConfig {
    /// A silent link that poses as real hardware.
    #[must_use]
    pub fn scripted_real() -> Self {
        Self {
            telemetry_interval: None,
            auto_reply: false,
            presented_mode: TransportMode::Real,
        }
    }
}

#[derive(Debug, Default)]
struct MockShared {
    fail_writes: AtomicBool,
    auto_reply: AtomicBool,
}

#[derive(Debug)]
enum MockControl {
    Inject(String),
    Disconnect,
    Fail(String),
}

/// Synthetic bridge link.
#[derive(Debug)]
pub struct MockLink {
    config: MockLinkConfig,
    shared: Arc<MockShared>,
    control_rx: mpsc::UnboundedReceiver<MockControl>,
    written_tx: mpsc::UnboundedSender<String>,
}

impl MockLink {
    /// Create a link and the handle that drives it.
    pub fn new(config: MockLinkConfig) -> (Self, MockLinkHandle) {
        let shared = Arc::new(MockShared::default());
        shared.auto_reply.store(config.auto_reply, Ordering::Relaxed);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();

        let link = Self {
            config,
            shared: Arc::clone(&shared),
            control_rx,
            written_tx,
        };
        let handle = MockLinkHandle {
            control_tx,
            written_rx,
            shared,
        };
        (link, handle)
    }

    /// Spawn the link task and return the opened link.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> OpenedLink {
        let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let mode = self.config.presented_mode;

        let writer = MockWriter {
            writes: writes_tx,
            shared: Arc::clone(&self.shared),
        };

        let task = MockLinkTask {
            telemetry: self.config.telemetry_interval.map(|period| {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            }),
            shared: self.shared,
            control_rx: self.control_rx,
            written_tx: self.written_tx,
            writes_rx,
            events_tx,
            calibration: HashMap::new(),
        };
        tokio::spawn(task.run());

        OpenedLink {
            mode,
            writer: AnyLinkWriter::Mock(writer),
            events: events_rx,
        }
    }
}

/// Test-side controls of a [`MockLink`].
#[derive(Debug)]
pub struct MockLinkHandle {
    control_tx: mpsc::UnboundedSender<MockControl>,
    written_rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<MockShared>,
}

impl MockLinkHandle {
    /// Deliver a line as if the bridge had sent it.
    pub fn inject_line(&self, line: impl Into<String>) {
        let _ = self.control_tx.send(MockControl::Inject(line.into()));
    }

    /// Simulate the cable being unplugged (end of stream).
    pub fn disconnect(&self) {
        let _ = self.control_tx.send(MockControl::Disconnect);
    }

    /// Simulate a read error on the link.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.control_tx.send(MockControl::Fail(reason.into()));
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Enable or disable firmware-style replies.
    pub fn set_auto_reply(&self, enabled: bool) {
        self.shared.auto_reply.store(enabled, Ordering::Relaxed);
    }

    /// Wait for the next line written to the link.
    pub async fn next_written(&mut self) -> Option<String> {
        self.written_rx.recv().await
    }

    /// Lines written so far and not yet observed.
    pub fn drain_written(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.written_rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}

/// Write half of a [`MockLink`].
#[derive(Debug)]
pub struct MockWriter {
    writes: mpsc::UnboundedSender<String>,
    shared: Arc<MockShared>,
}

impl LinkWriter for MockWriter {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        if self.shared.fail_writes.load(Ordering::Relaxed) {
            return Err(DeviceError::transport("simulated write failure"));
        }
        self.writes
            .send(line.to_string())
            .map_err(|_| DeviceError::transport("mock link closed"))
    }
}

struct MockLinkTask {
    telemetry: Option<Interval>,
    shared: Arc<MockShared>,
    control_rx: mpsc::UnboundedReceiver<MockControl>,
    written_tx: mpsc::UnboundedSender<String>,
    writes_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::Sender<LinkEvent>,
    calibration: HashMap<String, f64>,
}

impl MockLinkTask {
    async fn run(mut self) {
        let mut control_open = true;

        loop {
            tokio::select! {
                _ = tick(&mut self.telemetry) => {
                    let line = random_frame_line();
                    trace!(line = %line, "Mock telemetry");
                    if !self.emit(LinkEvent::Line(line)).await {
                        break;
                    }
                }
                write = self.writes_rx.recv() => {
                    let Some(line) = write else { break };
                    let _ = self.written_tx.send(line.clone());
                    if self.shared.auto_reply.load(Ordering::Relaxed) {
                        if let Some(reply) = self.reply_to(&line) {
                            if !self.emit(LinkEvent::Line(reply)).await {
                                break;
                            }
                        }
                    }
                }
                control = self.control_rx.recv(), if control_open => match control {
                    Some(MockControl::Inject(line)) => {
                        if !self.emit(LinkEvent::Line(line)).await {
                            break;
                        }
                    }
                    Some(MockControl::Disconnect) => {
                        let _ = self.events_tx.send(LinkEvent::Closed).await;
                        break;
                    }
                    Some(MockControl::Fail(reason)) => {
                        let _ = self.events_tx.send(LinkEvent::Error(reason)).await;
                        break;
                    }
                    None => control_open = false,
                },
                () = self.events_tx.closed() => break,
            }
        }

        debug!("Mock link task stopped");
    }

    async fn emit(&self, event: LinkEvent) -> bool {
        self.events_tx.send(event).await.is_ok()
    }

    fn reply_to(&mut self, line: &str) -> Option<String> {
        let d = FIELD_DELIMITER;
        let mut fields = line.splitn(3, FIELD_DELIMITER);
        let prefix = fields.next()?;
        let channel = fields.next();
        let value = fields.next();

        match (prefix, channel, value) {
            (TARE_PREFIX, Some(target), None) => Some(format!("{ACK_PREFIX}{d}{TARE_PREFIX}{d}{target}")),
            (CALIBRATION_SET_PREFIX, Some(channel), Some(value)) => {
                let value: f64 = value.parse().ok()?;
                self.calibration.insert(channel.to_string(), value);
                Some(format!("{ACK_PREFIX}{d}{CALIBRATION_SET_PREFIX}{d}{channel}"))
            }
            (CALIBRATION_GET_PREFIX, Some(channel), None) => {
                let value = self
                    .calibration
                    .get(channel)
                    .copied()
                    .unwrap_or(MOCK_DEFAULT_CALIBRATION);
                Some(format!("{CALIBRATION_GET_PREFIX}{d}{channel}{d}{value}"))
            }
            (SMS_PREFIX, Some(number), Some(_)) => {
                debug!(number = %number, "Mock: SMS accepted");
                Some(SMS_SUCCESS_MARKER.to_string())
            }
            (SERVO_PREFIX, Some(channel), Some(value)) => {
                debug!(channel = %channel, value = %value, "Mock: servo set");
                None
            }
            _ => {
                debug!(line = %line, "Mock: unrecognised command");
                None
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// A random frame within the physical range of the sensors.
fn random_frame_line() -> String {
    let mut rng = rand::thread_rng();
    let infrared = rng.gen_range(0..=MOCK_INFRARED_MAX);
    let mut weights = [0.0; WEIGH_CHANNEL_COUNT];
    for weight in &mut weights {
        // Whole grams keep the JSON text short.
        *weight = rng.gen_range(0.0..MOCK_WEIGHT_MAX_GRAMS).floor();
    }

    TelemetryFrame::new(infrared, weights)
        .to_line()
        .unwrap_or_else(|_| String::from("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcelbox_core::SnapshotOrigin;
    use parcelbox_protocol::parse_snapshot;

    fn quiet() -> MockLinkConfig {
        MockLinkConfig {
            telemetry_interval: None,
            ..Default::default()
        }
    }

    async fn next_line(opened: &mut OpenedLink) -> String {
        match opened.events.recv().await {
            Some(LinkEvent::Line(line)) => line,
            other => panic!("Expected line, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_is_periodic_and_bounded() {
        let (link, _handle) = MockLink::new(MockLinkConfig::default());
        let mut opened = link.start();
        assert_eq!(opened.mode, TransportMode::Mock);

        let start = Instant::now();
        for i in 1..=3u32 {
            let line = next_line(&mut opened).await;
            assert_eq!(start.elapsed(), Duration::from_secs(u64::from(i)));

            let snapshot = parse_snapshot(&line, SnapshotOrigin::Synthetic).unwrap();
            assert!(snapshot.infrared <= MOCK_INFRARED_MAX);
            assert!(
                snapshot
                    .weights
                    .iter()
                    .all(|w| (0.0..MOCK_WEIGHT_MAX_GRAMS).contains(w))
            );
        }
    }

    #[tokio::test]
    async fn test_calibration_roundtrip() {
        let (link, _handle) = MockLink::new(quiet());
        let mut opened = link.start();

        opened.writer.write_line("GETCAL:3").await.unwrap();
        assert_eq!(next_line(&mut opened).await, "GETCAL:3:1");

        opened.writer.write_line("CAL:3:420.5").await.unwrap();
        assert_eq!(next_line(&mut opened).await, "ACK:CAL:3");

        opened.writer.write_line("GETCAL:3").await.unwrap();
        assert_eq!(next_line(&mut opened).await, "GETCAL:3:420.5");
    }

    #[tokio::test]
    async fn test_sms_and_tare_replies() {
        let (link, _handle) = MockLink::new(quiet());
        let mut opened = link.start();

        opened.writer.write_line("TARE:ALL").await.unwrap();
        assert_eq!(next_line(&mut opened).await, "ACK:TARE:ALL");

        opened
            .writer
            .write_line("TXT:+5511987654321:hello: world")
            .await
            .unwrap();
        assert_eq!(next_line(&mut opened).await, SMS_SUCCESS_MARKER);
    }

    #[tokio::test]
    async fn test_servo_write_has_no_reply() {
        let (link, mut handle) = MockLink::new(quiet());
        let mut opened = link.start();

        opened.writer.write_line("S:1:90").await.unwrap();
        assert_eq!(handle.next_written().await.as_deref(), Some("S:1:90"));
        handle.inject_line("marker");
        assert_eq!(next_line(&mut opened).await, "marker");
    }

    #[tokio::test]
    async fn test_handle_controls() {
        let (link, mut handle) = MockLink::new(quiet());
        let mut opened = link.start();

        handle.set_auto_reply(false);
        opened.writer.write_line("TARE:1").await.unwrap();
        handle.inject_line("injected");
        assert_eq!(next_line(&mut opened).await, "injected");
        assert_eq!(handle.drain_written(), vec!["TARE:1".to_string()]);

        handle.set_fail_writes(true);
        let err = opened.writer.write_line("TARE:1").await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport { .. }));

        handle.disconnect();
        assert_eq!(opened.events.recv().await, Some(LinkEvent::Closed));
        assert_eq!(opened.events.recv().await, None);
    }
}
