//! Dual-channel SMS delivery.
//!
//! Every message goes out twice: first through the HTTP gateway (an Android
//! phone running an SMS relay), then through the GSM modem behind the bridge.
//! The gateway is best-effort; only the modem result is reported.

#![allow(async_fn_in_trait)]

use parcelbox_core::{PhoneNumber, SmsBody};
use parcelbox_hardware::{Device, DeviceError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::KioskResult;

/// SIM slot the gateway phone sends from.
pub const GATEWAY_SIM_NUMBER: u8 = 2;

/// JSON body accepted by the gateway's message endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMessage {
    pub message: String,
    pub phone_numbers: Vec<String>,
    pub sim_number: u8,
}

impl GatewayMessage {
    pub fn new(message: &str, number: &str) -> Self {
        Self {
            message: message.to_string(),
            phone_numbers: vec![number.to_string()],
            sim_number: GATEWAY_SIM_NUMBER,
        }
    }
}

/// External HTTP SMS gateway.
pub trait SmsGateway: Send + Sync {
    /// Hand one message to the gateway.
    async fn send(&self, message: &GatewayMessage) -> KioskResult<()>;
}

/// Gateway used when no credentials are configured; sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGateway;

impl SmsGateway for NoGateway {
    async fn send(&self, message: &GatewayMessage) -> KioskResult<()> {
        debug!(numbers = ?message.phone_numbers, "No SMS gateway configured, skipping");
        Ok(())
    }
}

pub struct SmsService<G = NoGateway> {
    gateway: G,
    device: Device,
}

impl SmsService<NoGateway> {
    /// Send through the modem only.
    pub fn device_only(device: Device) -> Self {
        Self::new(NoGateway, device)
    }
}

impl<G: SmsGateway> SmsService<G> {
    pub fn new(gateway: G, device: Device) -> Self {
        Self { gateway, device }
    }

    /// Send `message` to `number` through the gateway, then the modem.
    ///
    /// Input is validated before either channel is tried.
    ///
    /// # Errors
    ///
    /// Returns the modem outcome. Gateway failures are only logged.
    pub async fn send_sms(&self, message: &str, number: &str) -> KioskResult<()> {
        let number = PhoneNumber::new(number).map_err(DeviceError::from)?;
        let body = SmsBody::new(message).map_err(DeviceError::from)?;

        let request = GatewayMessage::new(body.as_str(), number.as_str());
        match self.gateway.send(&request).await {
            Ok(()) => info!(number = %number.as_str(), "SMS sent through gateway"),
            Err(e) => warn!(number = %number.as_str(), error = %e, "SMS gateway send failed"),
        }

        self.device.send_sms(number.as_str(), body.as_str()).await?;
        Ok(())
    }
}
