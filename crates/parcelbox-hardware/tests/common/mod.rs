//! Common test utilities for device integration tests.
//!
//! Every rig runs on a paused Tokio clock. Real links are stood in for by
//! scripted [`MockLink`]s that pose as hardware: they stay silent and never
//! answer on their own, so each test drives the bridge side explicitly
//! through the returned [`MockLinkHandle`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;

use parcelbox_core::TareTarget;
use parcelbox_hardware::{
    AnyGpio, Device, DeviceConfig, LinkTarget, MockGpio, MockGpioHandle, MockLink,
    MockLinkConfig, MockLinkHandle, ScriptedOpen,
};

/// Lock channels wired in every rig.
pub const LOCK_CHANNELS: usize = 3;

/// A started device plus the test-side handles of its hardware.
pub struct Rig {
    pub device: Device,
    pub link: MockLinkHandle,
    pub gpio: MockGpioHandle,
    pub mock_links: mpsc::UnboundedReceiver<MockLinkHandle>,
}

/// Defaults with the liveness probe off and three lock channels.
pub fn config() -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.liveness_probe = None;
    config.lock.channels = LOCK_CHANNELS;
    config
}

/// A silent link that reports itself as real hardware.
pub fn real_link() -> (MockLink, MockLinkHandle) {
    MockLink::new(MockLinkConfig::scripted_real())
}

/// Start a device whose real-link opens follow `script`.
pub async fn start_scripted(
    config: DeviceConfig,
    script: Vec<ScriptedOpen>,
) -> (Device, mpsc::UnboundedReceiver<MockLinkHandle>, MockGpioHandle) {
    let (gpio, gpio_handle) = MockGpio::new(config.lock.channels);
    let (handles_tx, handles_rx) = mpsc::unbounded_channel();

    let device = Device::builder(config)
        .link_target(LinkTarget::Scripted(VecDeque::from(script)))
        .gpio(AnyGpio::Mock(gpio))
        .mock_handles(handles_tx)
        .start()
        .await
        .expect("device start");
    settle().await;

    (device, handles_rx, gpio_handle)
}

/// Start a device on one scripted real link.
pub async fn start_real(config: DeviceConfig) -> Rig {
    let (link, handle) = real_link();
    let (device, mock_links, gpio) = start_scripted(config, vec![ScriptedOpen::Link(link)]).await;
    Rig {
        device,
        link: handle,
        gpio,
        mock_links,
    }
}

/// Let every task run until it blocks on I/O or a timer.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn tare(channel: u8) -> TareTarget {
    TareTarget::channel(channel).expect("valid channel")
}
