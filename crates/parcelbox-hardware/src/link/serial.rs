//! Serial port link to the microcontroller bridge.
//!
//! The port is opened 8N1 with a short read timeout. A dedicated reader
//! thread decodes lines with [`LineCodec`] and forwards them as
//! [`LinkEvent`]s; writes are performed on the blocking pool.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

use parcelbox_core::TransportMode;
use parcelbox_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PATH, SERIAL_READ_TIMEOUT_MS};
use parcelbox_protocol::LineCodec;

use super::{AnyLinkWriter, LINK_EVENT_CAPACITY, LinkEvent, OpenedLink};
use crate::error::{DeviceError, Result};
use crate::traits::LinkWriter;

const READ_CHUNK_SIZE: usize = 256;

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SERIAL_PATH.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Open the configured port and start its reader thread.
///
/// # Errors
///
/// Returns `DeviceError::Transport` if the port cannot be opened or cloned.
pub async fn open(config: &SerialConfig) -> Result<OpenedLink> {
    let path = config.path.clone();
    let baud_rate = config.baud_rate;

    let (port, reader) = tokio::task::spawn_blocking(move || -> Result<_> {
        let port = serialport::new(&path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
            .open()
            .map_err(|e| DeviceError::transport(format!("failed to open {path}: {e}")))?;
        let reader = port.try_clone()?;
        Ok((port, reader))
    })
    .await
    .map_err(|e| DeviceError::transport(e.to_string()))??;

    let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
    std::thread::Builder::new()
        .name("parcelbox-serial-rx".into())
        .spawn(move || read_loop(reader, &events_tx))?;

    info!(path = %config.path, baud_rate, "Serial link opened");

    Ok(OpenedLink {
        mode: TransportMode::Real,
        writer: AnyLinkWriter::Serial(SerialWriter {
            port: Arc::new(Mutex::new(port)),
            codec: LineCodec::new(),
        }),
        events: events_rx,
    })
}

fn read_loop(mut port: Box<dyn SerialPort>, events: &mpsc::Sender<LinkEvent>) {
    let mut codec = LineCodec::new();
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE * 4);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if events.is_closed() {
            break;
        }

        match port.read(&mut chunk) {
            Ok(0) => {
                let _ = events.blocking_send(LinkEvent::Closed);
                break;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if !drain_lines(&mut codec, &mut buffer, events) {
                    break;
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
            Err(e) => {
                let _ = events.blocking_send(LinkEvent::Error(e.to_string()));
                break;
            }
        }
    }

    debug!("Serial reader stopped");
}

/// Forward every complete line. Returns `false` once the receiver is gone.
fn drain_lines(
    codec: &mut LineCodec,
    buffer: &mut BytesMut,
    events: &mpsc::Sender<LinkEvent>,
) -> bool {
    loop {
        match codec.decode(buffer) {
            Ok(Some(line)) => {
                trace!(line = %line, "RX");
                if events.blocking_send(LinkEvent::Line(line)).is_err() {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => warn!(error = %e, "Dropping oversized line"),
        }
    }
}

/// Write half of the serial link.
pub struct SerialWriter {
    port: SharedPort,
    codec: LineCodec,
}

impl LinkWriter for SerialWriter {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(line, &mut frame)?;

        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
            port.write_all(&frame)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| DeviceError::transport(e.to_string()))??;

        trace!(line = %line, "TX");
        Ok(())
    }
}
