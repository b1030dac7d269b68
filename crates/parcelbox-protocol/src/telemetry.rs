//! Sensor telemetry frames: `{"infrared": <int>, "weights": [f, f, f, f]}`.

use serde::{Deserialize, Serialize};

use parcelbox_core::constants::WEIGH_CHANNEL_COUNT;
use parcelbox_core::{Error, Result, SensorSnapshot, SnapshotOrigin};

/// Telemetry frame exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub infrared: i64,
    pub weights: Vec<f64>,
}

impl TelemetryFrame {
    #[must_use]
    pub fn new(infrared: u32, weights: [f64; WEIGH_CHANNEL_COUNT]) -> Self {
        Self {
            infrared: i64::from(infrared),
            weights: weights.to_vec(),
        }
    }

    /// Serialize as a single JSON line (no terminator).
    ///
    /// # Errors
    /// Returns `Error::InvalidTelemetry` if a weight is not finite.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidTelemetry(e.to_string()))
    }

    /// Check structure and convert into a snapshot stamped now.
    ///
    /// # Errors
    /// Returns `Error::InvalidTelemetry` for a negative or oversized infrared
    /// level, a weight count other than four, or non-finite weights.
    pub fn into_snapshot(self, origin: SnapshotOrigin) -> Result<SensorSnapshot> {
        let infrared = u32::try_from(self.infrared).map_err(|_| {
            Error::InvalidTelemetry(format!("infrared out of range: {}", self.infrared))
        })?;

        let weights: [f64; WEIGH_CHANNEL_COUNT] =
            self.weights.as_slice().try_into().map_err(|_| {
                Error::InvalidTelemetry(format!(
                    "expected {WEIGH_CHANNEL_COUNT} weights, got {}",
                    self.weights.len()
                ))
            })?;

        if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
            return Err(Error::InvalidTelemetry(format!("weight is not finite: {bad}")));
        }

        Ok(SensorSnapshot::new(infrared, weights, origin))
    }
}

impl From<&SensorSnapshot> for TelemetryFrame {
    fn from(snapshot: &SensorSnapshot) -> Self {
        TelemetryFrame::new(snapshot.infrared, snapshot.weights)
    }
}

/// Returns `true` if the line looks like a JSON object (after trimming).
#[inline]
#[must_use]
pub fn looks_like_object(line: &str) -> bool {
    line.trim_start().starts_with('{')
}

/// Decode a telemetry line into a snapshot.
///
/// # Errors
/// Returns `Error::InvalidTelemetry` if the line is not valid JSON of the
/// frame shape or fails structural validation.
///
/// ```
/// use parcelbox_core::SnapshotOrigin;
/// use parcelbox_protocol::parse_snapshot;
///
/// let line = r#"{"infrared": 512, "weights": [0.0, 12.5, 0, 3]}"#;
/// let snapshot = parse_snapshot(line, SnapshotOrigin::Device).unwrap();
/// assert_eq!(snapshot.infrared, 512);
/// assert_eq!(snapshot.weights, [0.0, 12.5, 0.0, 3.0]);
/// ```
pub fn parse_snapshot(line: &str, origin: SnapshotOrigin) -> Result<SensorSnapshot> {
    let frame: TelemetryFrame =
        serde_json::from_str(line.trim()).map_err(|e| Error::InvalidTelemetry(e.to_string()))?;
    frame.into_snapshot(origin)
}
