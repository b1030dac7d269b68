//! Wire-level constants and operating defaults for the locker bridge.
//!
//! The microcontroller bridge speaks a newline-delimited text protocol over a
//! single serial line. Every outbound command is a colon-separated record and
//! every inbound line is one of: a JSON telemetry frame, an acknowledgement, an
//! explicit error, an SMS result marker, or free-form diagnostics.
//!
//! ```text
//! host  -> bridge   TARE:2\n
//! bridge -> host    {"infrared": 512, "weights": [0.0, 12.5, 0.0, 0.0]}\n
//! bridge -> host    ACK:TARE:2\n
//! ```
//!
//! # Usage
//!
//! ```
//! use parcelbox_core::constants::*;
//! use std::time::Duration;
//!
//! let line = format!("{TARE_PREFIX}{FIELD_DELIMITER}{TARE_ALL}");
//! assert_eq!(line, "TARE:ALL");
//!
//! let timeout = Duration::from_millis(DEFAULT_SMS_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 30);
//! ```

// ============================================================================
// Framing
// ============================================================================

/// Line terminator for both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Separator between the fields of an outbound command or an acknowledgement.
///
/// ```
/// use parcelbox_core::constants::FIELD_DELIMITER;
///
/// let parts: Vec<&str> = "GETCAL:2:420.5".split(FIELD_DELIMITER).collect();
/// assert_eq!(parts, vec!["GETCAL", "2", "420.5"]);
/// ```
pub const FIELD_DELIMITER: &str = ":";

/// Maximum accepted length of one inbound line in bytes.
///
/// Longer runs without a terminator are discarded by the line codec so that a
/// babbling device cannot grow the receive buffer without bound.
pub const MAX_LINE_LENGTH: usize = 1024;

// ============================================================================
// Command Prefixes
// ============================================================================

/// Servo actuation: `S:<channel>:<value 0-180>`. Fire-and-forget.
pub const SERVO_PREFIX: &str = "S";

/// Load-cell tare: `TARE:<channel|ALL>`, acknowledged by `ACK:TARE:<channel>`.
pub const TARE_PREFIX: &str = "TARE";

/// Target token for taring every load cell at once.
pub const TARE_ALL: &str = "ALL";

/// Calibration write: `CAL:<channel>:<value>`, acknowledged by `ACK:CAL:<channel>`.
pub const CALIBRATION_SET_PREFIX: &str = "CAL";

/// Calibration read: `GETCAL:<channel>`, answered by `GETCAL:<channel>:<value>`.
pub const CALIBRATION_GET_PREFIX: &str = "GETCAL";

/// SMS through the GSM modem: `TXT:<number>:<message>`.
pub const SMS_PREFIX: &str = "TXT";

/// Prefix of every positive acknowledgement.
pub const ACK_PREFIX: &str = "ACK";

// ============================================================================
// Inbound Markers
// ============================================================================

/// Substring that marks an explicit device-side failure.
pub const DEVICE_ERROR_MARKER: &str = "ERROR";

/// Substring reported once the modem accepted an SMS.
pub const SMS_SUCCESS_MARKER: &str = "SMS sent successfully";

/// Substrings reported when the modem rejected an SMS.
pub const SMS_FAILURE_MARKERS: [&str; 2] = ["SMS send failed", "ERROR: Failed to send SMS"];

/// Substring printed by the bridge firmware after boot (matched case-insensitively).
pub const READY_MARKER: &str = "arduino ready";

// ============================================================================
// Channels
// ============================================================================

/// Number of weighing/servo channels on the bridge.
pub const WEIGH_CHANNEL_COUNT: usize = 4;

/// Lowest weighing/servo channel number (channels are 1-based on the wire).
pub const MIN_WEIGH_CHANNEL: u8 = 1;

/// Highest weighing/servo channel number.
pub const MAX_WEIGH_CHANNEL: u8 = 4;

// ============================================================================
// Servo Mapping
// ============================================================================

/// Slowest (full reverse) continuous-rotation speed.
pub const MIN_SERVO_SPEED: i32 = -100;

/// Fastest (full forward) continuous-rotation speed.
pub const MAX_SERVO_SPEED: i32 = 100;

/// Servo pulse value at which a continuous-rotation servo stops.
pub const SERVO_STOP_VALUE: u8 = 90;

/// Largest servo pulse value accepted by the firmware.
pub const MAX_SERVO_VALUE: u8 = 180;

// ============================================================================
// SMS Constraints
// ============================================================================

/// Minimum digits in a destination number (excluding a leading `+`).
pub const MIN_PHONE_DIGITS: usize = 7;

/// Maximum digits in a destination number (E.164 limit).
pub const MAX_PHONE_DIGITS: usize = 15;

/// Maximum SMS body length in characters (single GSM-7 segment).
pub const MAX_SMS_LENGTH: usize = 160;

// ============================================================================
// Timing Defaults (milliseconds)
// ============================================================================

/// Default per-command acknowledgement timeout.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Default SMS completion timeout, measured from transmission of `TXT:`.
pub const DEFAULT_SMS_TIMEOUT_MS: u64 = 30_000;

/// Default unlock→relock window for one compartment sequence.
pub const DEFAULT_RELOCK_TIMEOUT_MS: u64 = 40_000;

/// Upper bound for any configured or caller-supplied timeout (one day).
pub const MAX_TIMEOUT_MS: u64 = 86_400_000;

/// Magnet sensor polling period.
pub const MAGNET_POLL_INTERVAL_MS: u64 = 100;

/// Period of synthetic telemetry frames while in mock mode.
pub const MOCK_TELEMETRY_INTERVAL_MS: u64 = 1_000;

/// Delay before the single reconnect attempt after losing a healthy link.
pub const RECONNECT_DELAY_MS: u64 = 5_000;

/// How long a freshly opened serial link may stay silent before it is
/// considered dead.
pub const DEFAULT_LIVENESS_PROBE_MS: u64 = 5_000;

// ============================================================================
// Serial Defaults
// ============================================================================

/// Default device path of the bridge.
pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyUSB0";

/// Default baud rate of the bridge.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read timeout applied to the blocking serial reader.
pub const SERIAL_READ_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Synthetic Telemetry Bounds
// ============================================================================

/// Largest synthetic infrared reading (10-bit ADC).
pub const MOCK_INFRARED_MAX: u32 = 1023;

/// Largest synthetic load-cell reading in grams.
pub const MOCK_WEIGHT_MAX_GRAMS: f64 = 20_000.0;

/// Calibration factor reported by the synthetic bridge before any `CAL:` write.
pub const MOCK_DEFAULT_CALIBRATION: f64 = 1.0;
