//! Property-based tests for the bridge protocol.

use bytes::BytesMut;
use parcelbox_core::{SensorSnapshot, SnapshotOrigin};
use parcelbox_protocol::{
    InboundLine, LineCodec, TelemetryFrame, classify, parse_snapshot, servo_value_for_speed,
};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

/// Printable single-line text without line terminators.
fn single_line() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,80}").expect("Failed to create line regex strategy")
}

/// Load-cell readings in quarter grams, which survive a JSON round trip exactly.
fn weights() -> impl Strategy<Value = [f64; 4]> {
    prop::array::uniform4((0u32..80_000).prop_map(|q| f64::from(q) / 4.0))
}

proptest! {
    /// Servo values stay within 0-180 and are monotonic in speed.
    #[test]
    fn prop_servo_value_bounded_and_monotonic(a in any::<i32>(), b in any::<i32>()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (vlo, vhi) = (servo_value_for_speed(lo), servo_value_for_speed(hi));
        prop_assert!(vhi <= 180);
        prop_assert!(vlo <= vhi);
    }

    /// Any chunking of a byte stream yields the same lines.
    #[test]
    fn prop_codec_chunking_independent(
        lines in prop::collection::vec(single_line(), 1..10),
        split_points in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let mut wire = BytesMut::new();
        let mut encoder = LineCodec::new();
        for line in &lines {
            encoder.encode(line.as_str(), &mut wire).unwrap();
        }
        let wire = wire.freeze();

        let mut cuts: Vec<usize> = split_points.iter().map(|i| i.index(wire.len() + 1)).collect();
        cuts.push(0);
        cuts.push(wire.len());
        cuts.sort_unstable();

        let mut decoder = LineCodec::new();
        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();
        for window in cuts.windows(2) {
            buffer.extend_from_slice(&wire[window[0]..window[1]]);
            while let Some(line) = decoder.decode(&mut buffer).unwrap() {
                decoded.push(line);
            }
        }

        prop_assert_eq!(decoded, lines);
    }

    /// Frames produced for a snapshot always classify back as telemetry.
    #[test]
    fn prop_generated_frames_classify_as_telemetry(
        infrared in 0u32..=1023,
        weights in weights(),
    ) {
        let snapshot = SensorSnapshot::new(infrared, weights, SnapshotOrigin::Synthetic);
        let line = TelemetryFrame::from(&snapshot).to_line().unwrap();

        match classify(&line, false, SnapshotOrigin::Synthetic) {
            InboundLine::Telemetry(decoded) => prop_assert!(decoded.same_readings(&snapshot)),
            other => prop_assert!(false, "unexpected classification: {:?}", other),
        }
    }

    /// Classification never panics and never turns an object-looking line
    /// into a command candidate.
    #[test]
    fn prop_object_lines_never_reach_command_engine(tail in single_line(), sms in any::<bool>()) {
        let line = format!("{{{tail}");
        let classified = classify(&line, sms, SnapshotOrigin::Device);
        let is_candidate = matches!(classified, InboundLine::Candidate { .. });
        prop_assert!(!is_candidate);
    }

    /// Arbitrary text never panics the snapshot parser.
    #[test]
    fn prop_parse_snapshot_total(line in ".{0,120}") {
        let _ = parse_snapshot(&line, SnapshotOrigin::Device);
    }
}
