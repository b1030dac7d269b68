//! Outbound bridge commands and the acknowledgements that complete them.

use std::fmt;
use std::sync::Arc;

use parcelbox_core::constants::{
    ACK_PREFIX, CALIBRATION_GET_PREFIX, CALIBRATION_SET_PREFIX, FIELD_DELIMITER, SERVO_PREFIX,
    SMS_PREFIX, TARE_PREFIX,
};
use parcelbox_core::{Error, PhoneNumber, Result, SmsBody, TareTarget, WeighChannel};

/// Decides whether an inbound line completes the active command.
#[derive(Clone)]
pub enum AckMatcher {
    /// Line contains the literal text anywhere.
    Contains(String),
    /// Line starts with the literal text.
    Prefix(String),
    /// Arbitrary line predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl AckMatcher {
    pub fn contains(text: impl Into<String>) -> Self {
        AckMatcher::Contains(text.into())
    }

    pub fn prefix(text: impl Into<String>) -> Self {
        AckMatcher::Prefix(text.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        AckMatcher::Predicate(Arc::new(f))
    }

    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            AckMatcher::Contains(text) => line.contains(text.as_str()),
            AckMatcher::Prefix(text) => line.starts_with(text.as_str()),
            AckMatcher::Predicate(f) => f(line),
        }
    }
}

impl fmt::Debug for AckMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMatcher::Contains(text) => f.debug_tuple("Contains").field(text).finish(),
            AckMatcher::Prefix(text) => f.debug_tuple("Prefix").field(text).finish(),
            AckMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A command the host can send to the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Drive a continuous-rotation servo (`value` 0-180, 90 = stop).
    Servo { channel: WeighChannel, value: u8 },
    /// Zero one or all load cells.
    Tare(TareTarget),
    /// Store a load-cell calibration factor.
    SetCalibration { channel: WeighChannel, value: f64 },
    /// Read back a load-cell calibration factor.
    GetCalibration(WeighChannel),
    /// Hand an SMS to the GSM modem.
    SendSms { number: PhoneNumber, body: SmsBody },
}

impl DeviceCommand {
    /// Wire text without the line terminator.
    ///
    /// ```
    /// use parcelbox_core::{TareTarget, WeighChannel};
    /// use parcelbox_protocol::DeviceCommand;
    ///
    /// let channel = WeighChannel::new(2).unwrap();
    /// assert_eq!(DeviceCommand::GetCalibration(channel).encode(), "GETCAL:2");
    /// assert_eq!(DeviceCommand::Tare(TareTarget::All).encode(), "TARE:ALL");
    /// ```
    #[must_use]
    pub fn encode(&self) -> String {
        let d = FIELD_DELIMITER;
        match self {
            DeviceCommand::Servo { channel, value } => format!("{SERVO_PREFIX}{d}{channel}{d}{value}"),
            DeviceCommand::Tare(target) => format!("{TARE_PREFIX}{d}{target}"),
            DeviceCommand::SetCalibration { channel, value } => {
                format!("{CALIBRATION_SET_PREFIX}{d}{channel}{d}{value}")
            }
            DeviceCommand::GetCalibration(channel) => {
                format!("{CALIBRATION_GET_PREFIX}{d}{channel}")
            }
            DeviceCommand::SendSms { number, body } => format!("{SMS_PREFIX}{d}{number}{d}{body}"),
        }
    }

    /// Acknowledgement that completes this command.
    ///
    /// `None` for fire-and-forget servo writes and for SMS, which completes
    /// through a separate marker line.
    #[must_use]
    pub fn ack(&self) -> Option<AckMatcher> {
        let d = FIELD_DELIMITER;
        match self {
            DeviceCommand::Servo { .. } | DeviceCommand::SendSms { .. } => None,
            DeviceCommand::Tare(target) => {
                Some(AckMatcher::prefix(format!("{ACK_PREFIX}{d}{TARE_PREFIX}{d}{target}")))
            }
            DeviceCommand::SetCalibration { channel, .. } => Some(AckMatcher::prefix(format!(
                "{ACK_PREFIX}{d}{CALIBRATION_SET_PREFIX}{d}{channel}"
            ))),
            DeviceCommand::GetCalibration(channel) => {
                let channel = *channel;
                Some(AckMatcher::predicate(move |line| {
                    parse_calibration_reply(line)
                        .is_ok_and(|(replied, _)| replied == channel)
                }))
            }
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceCommand::Servo { .. } => "servo",
            DeviceCommand::Tare(_) => "tare",
            DeviceCommand::SetCalibration { .. } => "set_calibration",
            DeviceCommand::GetCalibration(_) => "get_calibration",
            DeviceCommand::SendSms { .. } => "send_sms",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Parse a `GETCAL:<channel>:<value>` reply.
///
/// # Errors
/// Returns `Error::InvalidReply` if the line is not a calibration reply, or
/// `Error::InvalidChannel` if the channel is out of range.
pub fn parse_calibration_reply(line: &str) -> Result<(WeighChannel, f64)> {
    let mut fields = line.trim().split(FIELD_DELIMITER);

    if fields.next() != Some(CALIBRATION_GET_PREFIX) {
        return Err(Error::InvalidReply(format!("not a calibration reply: {line}")));
    }

    let (Some(channel), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(Error::InvalidReply(format!(
            "expected GETCAL:<channel>:<value>, got {line}"
        )));
    };

    let channel: WeighChannel = channel.parse()?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidReply(format!("calibration value is not a number: {value}")))?;

    if !value.is_finite() {
        return Err(Error::InvalidReply(format!(
            "calibration value is not finite: {value}"
        )));
    }

    Ok((channel, value))
}
