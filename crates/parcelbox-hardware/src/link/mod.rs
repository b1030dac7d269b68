//! Bridge link selection: the physical serial port or a synthetic stand-in.
//!
//! A link is split into a write half ([`AnyLinkWriter`]) owned by the
//! controller task and a stream of [`LinkEvent`]s produced by a background
//! reader. The [`TransportSelector`] decides which kind of link to open.
//!
//! ```text
//! ┌──────────────┐  open()   ┌────────────────┐
//! │  Transport   │──────────►│ serial port    │  Real
//! │  Selector    │           └────────────────┘
//! │              │  failure  ┌────────────────┐
//! │              │──────────►│ MockLink task  │  Mock
//! └──────────────┘           └────────────────┘
//! ```

pub mod mock;
pub mod serial;

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{info, warn};

use parcelbox_core::TransportMode;

use crate::error::{DeviceError, Result};
use crate::traits::LinkWriter;

pub use mock::{MockLink, MockLinkConfig, MockLinkHandle, MockWriter};
pub use serial::{SerialConfig, SerialWriter};

/// Capacity of the inbound event channel of every link.
pub(crate) const LINK_EVENT_CAPACITY: usize = 256;

/// Something that happened on the read side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One complete line, terminator stripped.
    Line(String),
    /// The link reached end of stream.
    Closed,
    /// The link failed; carries the reason.
    Error(String),
}

/// Enum wrapper for link writer dispatch.
pub enum AnyLinkWriter {
    Serial(SerialWriter),
    Mock(MockWriter),
}

impl LinkWriter for AnyLinkWriter {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        match self {
            Self::Serial(writer) => writer.write_line(line).await,
            Self::Mock(writer) => writer.write_line(line).await,
        }
    }
}

/// A freshly opened link.
pub struct OpenedLink {
    pub mode: TransportMode,
    pub writer: AnyLinkWriter,
    pub events: mpsc::Receiver<LinkEvent>,
}

/// One scripted result of a "real" open attempt.
#[derive(Debug)]
pub enum ScriptedOpen {
    /// The attempt fails with the given reason.
    Fail(String),
    /// The attempt succeeds with this link.
    Link(MockLink),
}

/// Where real links come from.
#[derive(Debug)]
pub enum LinkTarget {
    /// Open the configured serial port.
    Serial(SerialConfig),
    /// Hand out pre-built links in order. Exhausted scripts fail to open.
    Scripted(VecDeque<ScriptedOpen>),
}

/// Opens real links and falls back to synthetic ones.
#[derive(Debug)]
pub struct TransportSelector {
    target: LinkTarget,
    mock_config: MockLinkConfig,
    mock_handles: Option<mpsc::UnboundedSender<MockLinkHandle>>,
}

impl TransportSelector {
    pub fn new(target: LinkTarget, mock_config: MockLinkConfig) -> Self {
        Self {
            target,
            mock_config,
            mock_handles: None,
        }
    }

    /// Publish the handle of every synthetic link this selector creates.
    #[must_use]
    pub fn with_mock_handles(mut self, handles: mpsc::UnboundedSender<MockLinkHandle>) -> Self {
        self.mock_handles = Some(handles);
        self
    }

    /// Open the real link, or a synthetic one if that fails.
    pub async fn open(&mut self) -> OpenedLink {
        match self.open_real().await {
            Ok(link) => link,
            Err(e) => {
                warn!(error = %e, "Bridge not available, entering mock mode");
                self.open_mock()
            }
        }
    }

    /// Open the real link only.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Transport` if the link cannot be opened.
    pub async fn open_real(&mut self) -> Result<OpenedLink> {
        match &mut self.target {
            LinkTarget::Serial(config) => serial::open(config).await,
            LinkTarget::Scripted(script) => match script.pop_front() {
                Some(ScriptedOpen::Link(link)) => Ok(link.start()),
                Some(ScriptedOpen::Fail(reason)) => Err(DeviceError::transport(reason)),
                None => Err(DeviceError::transport("no scripted link left")),
            },
        }
    }

    /// Start a new synthetic link.
    pub fn open_mock(&mut self) -> OpenedLink {
        let (link, handle) = MockLink::new(self.mock_config.clone());
        if let Some(handles) = &self.mock_handles {
            let _ = handles.send(handle);
        }
        info!("Synthetic bridge link started");
        link.start()
    }
}
