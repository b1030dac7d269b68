use crate::{
    Result,
    constants::{
        MAX_PHONE_DIGITS, MAX_SMS_LENGTH, MAX_WEIGH_CHANNEL, MIN_PHONE_DIGITS, MIN_WEIGH_CHANNEL,
        TARE_ALL, WEIGH_CHANNEL_COUNT,
    },
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weighing/servo channel on the bridge (1-4, as written on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeighChannel(u8);

impl WeighChannel {
    /// Create a new channel with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidChannel` if the channel is outside 1-4.
    pub fn new(channel: u8) -> Result<Self> {
        if !(MIN_WEIGH_CHANNEL..=MAX_WEIGH_CHANNEL).contains(&channel) {
            return Err(Error::InvalidChannel(format!(
                "channel must be {MIN_WEIGH_CHANNEL}-{MAX_WEIGH_CHANNEL}, got {channel}"
            )));
        }
        Ok(WeighChannel(channel))
    }

    /// Get the wire channel number.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Zero-based index into per-channel arrays.
    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0 - MIN_WEIGH_CHANNEL)
    }

    /// All channels in ascending order.
    pub fn all() -> impl Iterator<Item = WeighChannel> {
        (MIN_WEIGH_CHANNEL..=MAX_WEIGH_CHANNEL).map(WeighChannel)
    }
}

impl fmt::Display for WeighChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WeighChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let channel: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidChannel(format!("not a channel number: {s}")))?;
        WeighChannel::new(channel)
    }
}

/// Target of a tare operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TareTarget {
    Channel(WeighChannel),
    All,
}

impl TareTarget {
    /// Tare a single channel given its wire number.
    ///
    /// # Errors
    /// Returns `Error::InvalidChannel` if the channel is outside 1-4.
    pub fn channel(channel: u8) -> Result<Self> {
        Ok(TareTarget::Channel(WeighChannel::new(channel)?))
    }
}

impl fmt::Display for TareTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TareTarget::Channel(channel) => write!(f, "{channel}"),
            TareTarget::All => write!(f, "{TARE_ALL}"),
        }
    }
}

impl std::str::FromStr for TareTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case(TARE_ALL) {
            return Ok(TareTarget::All);
        }
        Ok(TareTarget::Channel(s.parse()?))
    }
}

/// SMS destination number
///
/// Accepts an optional leading `+` followed by 7-15 ASCII digits. Surrounding
/// whitespace is trimmed before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Create a new phone number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidPhoneNumber` if the number does not match the
    /// accepted pattern.
    pub fn new(number: &str) -> Result<Self> {
        let number = number.trim();
        let digits = number.strip_prefix('+').unwrap_or(number);

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidPhoneNumber(format!(
                "only digits and a leading '+' are allowed: {number}"
            )));
        }

        let len = digits.len();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&len) {
            return Err(Error::InvalidPhoneNumber(format!(
                "expected {MIN_PHONE_DIGITS}-{MAX_PHONE_DIGITS} digits, got {len}"
            )));
        }

        Ok(PhoneNumber(number.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PhoneNumber::new(s)
    }
}

/// SMS message body
///
/// Must be non-empty after trimming, at most 160 characters and free of line
/// breaks (a newline would terminate the `TXT:` command early).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsBody(String);

impl SmsBody {
    /// Create a new SMS body with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSmsBody` if the body is empty, too long, or
    /// contains CR/LF.
    pub fn new(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Err(Error::InvalidSmsBody("message must not be empty".to_string()));
        }

        if body.contains(['\r', '\n']) {
            return Err(Error::InvalidSmsBody(
                "message must not contain line breaks".to_string(),
            ));
        }

        let len = body.chars().count();
        if len > MAX_SMS_LENGTH {
            return Err(Error::InvalidSmsBody(format!(
                "message must be at most {MAX_SMS_LENGTH} chars, got {len}"
            )));
        }

        Ok(SmsBody(body.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SmsBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOrigin {
    /// Decoded from a frame sent by the physical bridge
    Device,
    /// Generated locally while no hardware is attached
    Synthetic,
}

/// Latest sensor readings: one infrared level and four load-cell weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub infrared: u32,
    pub weights: [f64; WEIGH_CHANNEL_COUNT],
    pub received_at: DateTime<Utc>,
    pub origin: SnapshotOrigin,
}

impl SensorSnapshot {
    #[must_use]
    pub fn new(infrared: u32, weights: [f64; WEIGH_CHANNEL_COUNT], origin: SnapshotOrigin) -> Self {
        SensorSnapshot {
            infrared,
            weights,
            received_at: Utc::now(),
            origin,
        }
    }

    /// All-zero snapshot served before the first frame arrives.
    #[must_use]
    pub fn empty() -> Self {
        SensorSnapshot::new(0, [0.0; WEIGH_CHANNEL_COUNT], SnapshotOrigin::Synthetic)
    }

    /// Weight reported for one channel.
    #[must_use]
    pub fn weight(&self, channel: WeighChannel) -> f64 {
        self.weights[channel.index()]
    }

    /// Compare readings, ignoring timestamp and origin.
    #[must_use]
    pub fn same_readings(&self, other: &SensorSnapshot) -> bool {
        self.infrared == other.infrared && self.weights == other.weights
    }
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        SensorSnapshot::empty()
    }
}

/// Which transport currently backs the bridge link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Disconnected,
    Mock,
    Real,
}

impl TransportMode {
    /// Returns `true` if commands can currently be written.
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        !matches!(self, TransportMode::Disconnected)
    }

    #[inline]
    #[must_use]
    pub fn is_real(self) -> bool {
        matches!(self, TransportMode::Real)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportMode::Disconnected => write!(f, "disconnected"),
            TransportMode::Mock => write!(f, "mock"),
            TransportMode::Real => write!(f, "real"),
        }
    }
}

/// Magnet readings for every lock channel; `true` means magnet detected (door closed)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MagnetState(Vec<bool>);

impl MagnetState {
    #[must_use]
    pub fn new(readings: Vec<bool>) -> Self {
        MagnetState(readings)
    }

    /// Every channel reading closed.
    #[must_use]
    pub fn all_closed(channels: usize) -> Self {
        MagnetState(vec![true; channels])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reading for a zero-based lock channel, `None` if out of range.
    #[must_use]
    pub fn is_closed(&self, channel: usize) -> Option<bool> {
        self.0.get(channel).copied()
    }

    #[must_use]
    pub fn readings(&self) -> &[bool] {
        &self.0
    }

    /// Channels whose reading differs from `previous`.
    #[must_use]
    pub fn changed_channels(&self, previous: &MagnetState) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(i, reading)| previous.0.get(*i) != Some(*reading))
            .map(|(i, _)| i)
            .collect()
    }
}
