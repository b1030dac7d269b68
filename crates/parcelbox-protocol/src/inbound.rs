//! Classification of inbound bridge lines.
//!
//! One serial line carries three interleaved sub-protocols. Each line is
//! classified in a fixed order:
//!
//! 1. SMS result marker, only while an SMS job is in flight
//! 2. JSON telemetry frame
//! 3. candidate acknowledgement / error / diagnostic line for the command engine
//!
//! A line that starts like a JSON object but does not decode into a valid
//! frame is reported as [`InboundLine::MalformedTelemetry`] so the caller can
//! log and drop it. It is never forwarded as a command reply.

use parcelbox_core::constants::{READY_MARKER, SMS_FAILURE_MARKERS, SMS_SUCCESS_MARKER};
use parcelbox_core::{SensorSnapshot, SnapshotOrigin};

use crate::telemetry::{looks_like_object, parse_snapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// Blank line (after trimming).
    Empty,
    /// The in-flight SMS was accepted by the modem.
    SmsSent,
    /// The in-flight SMS was rejected; carries the raw line.
    SmsFailed(String),
    /// A valid sensor frame.
    Telemetry(SensorSnapshot),
    /// Object-looking line that failed to decode; carries the reason.
    MalformedTelemetry(String),
    /// Anything else. `ready` is set when the line carries the boot marker.
    Candidate { text: String, ready: bool },
}

/// Classify one line received from the bridge.
///
/// ```
/// use parcelbox_core::SnapshotOrigin;
/// use parcelbox_protocol::{InboundLine, classify};
///
/// let line = classify("SMS sent successfully", true, SnapshotOrigin::Device);
/// assert_eq!(line, InboundLine::SmsSent);
///
/// // Without an SMS in flight the marker is just another line.
/// let line = classify("SMS sent successfully", false, SnapshotOrigin::Device);
/// assert!(matches!(line, InboundLine::Candidate { .. }));
/// ```
#[must_use]
pub fn classify(line: &str, sms_in_flight: bool, origin: SnapshotOrigin) -> InboundLine {
    let text = line.trim();
    if text.is_empty() {
        return InboundLine::Empty;
    }

    if sms_in_flight {
        if text.contains(SMS_SUCCESS_MARKER) {
            return InboundLine::SmsSent;
        }
        if is_sms_failure_marker(text) {
            return InboundLine::SmsFailed(text.to_string());
        }
    }

    if looks_like_object(text) {
        return match parse_snapshot(text, origin) {
            Ok(snapshot) => InboundLine::Telemetry(snapshot),
            Err(e) => InboundLine::MalformedTelemetry(e.to_string()),
        };
    }

    InboundLine::Candidate {
        text: text.to_string(),
        ready: is_ready_marker(text),
    }
}

/// The line reports the outcome of an SMS, successful or not.
///
/// Such a line arriving with no job in flight is a late report for a job
/// that already timed out.
#[must_use]
pub fn is_sms_marker(line: &str) -> bool {
    line.contains(SMS_SUCCESS_MARKER) || is_sms_failure_marker(line)
}

fn is_sms_failure_marker(line: &str) -> bool {
    SMS_FAILURE_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Case-insensitive check for the firmware boot marker.
#[must_use]
pub fn is_ready_marker(line: &str) -> bool {
    line.to_ascii_lowercase().contains(READY_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ORIGIN: SnapshotOrigin = SnapshotOrigin::Device;

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\r")]
    fn test_empty(#[case] line: &str) {
        assert_eq!(classify(line, true, ORIGIN), InboundLine::Empty);
    }

    #[rstest]
    #[case("SMS send failed")]
    #[case("ERROR: Failed to send SMS")]
    #[case("modem: SMS send failed (code 500)")]
    fn test_sms_failure_markers(#[case] line: &str) {
        assert!(matches!(
            classify(line, true, ORIGIN),
            InboundLine::SmsFailed(_)
        ));
    }

    #[test]
    fn test_sms_marker_takes_priority_over_json() {
        // Marker check runs before JSON detection.
        let line = r#"{"status": "SMS sent successfully"}"#;
        assert_eq!(classify(line, true, ORIGIN), InboundLine::SmsSent);
    }

    #[test]
    fn test_failure_marker_without_sms_is_device_error_candidate() {
        let line = classify("ERROR: Failed to send SMS", false, ORIGIN);
        assert_eq!(
            line,
            InboundLine::Candidate {
                text: "ERROR: Failed to send SMS".into(),
                ready: false
            }
        );
    }

    #[rstest]
    #[case("SMS sent successfully", true)]
    #[case("ERROR: Failed to send SMS", true)]
    #[case("SMS send failed", true)]
    #[case("ERROR: HX711 not found", false)]
    #[case("ACK:TARE:1", false)]
    fn test_sms_marker_detection(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(is_sms_marker(line), expected);
    }

    #[test]
    fn test_telemetry() {
        let line = r#"{"infrared": 300, "weights": [1, 2, 3, 4]}"#;
        match classify(line, false, SnapshotOrigin::Synthetic) {
            InboundLine::Telemetry(snapshot) => {
                assert_eq!(snapshot.infrared, 300);
                assert_eq!(snapshot.origin, SnapshotOrigin::Synthetic);
            }
            other => panic!("Expected telemetry, got {other:?}"),
        }
    }

    #[rstest]
    #[case("{not json")]
    #[case(r#"{"infrared": 1, "weights": [1]}"#)]
    #[case("{}")]
    fn test_malformed_telemetry_is_not_forwarded(#[case] line: &str) {
        assert!(matches!(
            classify(line, false, ORIGIN),
            InboundLine::MalformedTelemetry(_)
        ));
    }

    #[rstest]
    #[case("Arduino ready", true)]
    #[case("ARDUINO READY v2", true)]
    #[case("ACK:TARE:1", false)]
    #[case("HX711 init", false)]
    fn test_candidate_readiness(#[case] line: &str, #[case] ready: bool) {
        assert_eq!(
            classify(line, false, ORIGIN),
            InboundLine::Candidate {
                text: line.to_string(),
                ready
            }
        );
    }

    #[test]
    fn test_candidate_is_trimmed() {
        assert_eq!(
            classify("  ACK:CAL:2 \r", false, ORIGIN),
            InboundLine::Candidate {
                text: "ACK:CAL:2".into(),
                ready: false
            }
        );
    }
}
