//! Device controller configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration. Durations are stored as integer milliseconds.
//!
//! ```
//! use std::time::Duration;
//! use parcelbox_hardware::DeviceConfig;
//!
//! let config: DeviceConfig = serde_json::from_str(r#"{"sms_timeout_ms": 45000}"#).unwrap();
//! assert_eq!(config.sms_timeout, Duration::from_secs(45));
//! assert_eq!(config.command_timeout, Duration::from_secs(10));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use parcelbox_core::TransportMode;
use parcelbox_core::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_LIVENESS_PROBE_MS, DEFAULT_RELOCK_TIMEOUT_MS,
    DEFAULT_SMS_TIMEOUT_MS, MAGNET_POLL_INTERVAL_MS, MAX_TIMEOUT_MS, MOCK_TELEMETRY_INTERVAL_MS,
    RECONNECT_DELAY_MS,
};

use crate::error::{DeviceError, Result};
use crate::link::{MockLinkConfig, SerialConfig};

/// What to do when a freshly opened serial link never says anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailurePolicy {
    /// Drop the silent link and run on synthetic data.
    #[default]
    FallBackToMock,
    /// Treat the silent link as a fatal fault.
    Terminate,
}

/// Fate of queued SMS jobs when the link goes away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsRetention {
    /// Fail every queued job.
    #[default]
    DiscardOnDisconnect,
    /// Keep queued jobs for the next link. The in-flight job still fails.
    RetainAcrossReconnect,
}

/// Lock supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Number of lock channels wired to the GPIO bank.
    pub channels: usize,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Relock timeout used when the caller does not give one.
    #[serde(rename = "relock_timeout_ms", with = "millis")]
    pub relock_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            poll_interval: Duration::from_millis(MAGNET_POLL_INTERVAL_MS),
            relock_timeout: Duration::from_millis(DEFAULT_RELOCK_TIMEOUT_MS),
        }
    }
}

/// Configuration of the whole device controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub serial: SerialConfig,
    #[serde(rename = "command_timeout_ms", with = "millis")]
    pub command_timeout: Duration,
    #[serde(rename = "sms_timeout_ms", with = "millis")]
    pub sms_timeout: Duration,
    /// Period of synthetic telemetry in mock mode.
    #[serde(rename = "mock_interval_ms", with = "millis")]
    pub mock_interval: Duration,
    /// How long a new serial link may stay silent. `None` disables the probe.
    #[serde(rename = "liveness_probe_ms", with = "opt_millis")]
    pub liveness_probe: Option<Duration>,
    pub probe_failure: ProbeFailurePolicy,
    pub sms_retention: SmsRetention,
    #[serde(rename = "reconnect_delay_ms", with = "millis")]
    pub reconnect_delay: Duration,
    pub lock: LockConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            sms_timeout: Duration::from_millis(DEFAULT_SMS_TIMEOUT_MS),
            mock_interval: Duration::from_millis(MOCK_TELEMETRY_INTERVAL_MS),
            liveness_probe: Some(Duration::from_millis(DEFAULT_LIVENESS_PROBE_MS)),
            probe_failure: ProbeFailurePolicy::default(),
            sms_retention: SmsRetention::default(),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            lock: LockConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Reject settings the controller cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("command_timeout_ms", self.command_timeout),
            ("sms_timeout_ms", self.sms_timeout),
            ("mock_interval_ms", self.mock_interval),
            ("lock.poll_interval_ms", self.lock.poll_interval),
            ("lock.relock_timeout_ms", self.lock.relock_timeout),
        ];
        for (name, duration) in durations {
            check_timeout(name, duration)?;
        }
        if let Some(window) = self.liveness_probe {
            check_timeout("liveness_probe_ms", window)?;
        }
        if self.reconnect_delay > max_timeout() {
            return Err(DeviceError::validation(format!(
                "reconnect_delay_ms must not exceed {MAX_TIMEOUT_MS}"
            )));
        }
        if self.lock.channels == 0 {
            return Err(DeviceError::validation("lock.channels must be at least 1"));
        }
        if self.serial.path.trim().is_empty() {
            return Err(DeviceError::validation("serial.path must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(DeviceError::validation("serial.baud_rate must be positive"));
        }
        Ok(())
    }

    /// Settings of the synthetic link used in mock mode.
    #[must_use]
    pub fn mock_link_config(&self) -> MockLinkConfig {
        MockLinkConfig {
            telemetry_interval: Some(self.mock_interval),
            auto_reply: true,
            presented_mode: TransportMode::Mock,
        }
    }
}

fn max_timeout() -> Duration {
    Duration::from_millis(MAX_TIMEOUT_MS)
}

/// Accept a timeout only if it is positive and at most [`MAX_TIMEOUT_MS`].
///
/// # Errors
///
/// Returns `DeviceError::Validation` naming `name` otherwise.
pub fn check_timeout(name: &str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(DeviceError::validation(format!("{name} must be positive")));
    }
    if timeout > max_timeout() {
        return Err(DeviceError::validation(format!(
            "{name} must not exceed {MAX_TIMEOUT_MS}ms"
        )));
    }
    Ok(())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
