pub mod codec;
pub mod commands;
pub mod inbound;
pub mod servo;
pub mod telemetry;

pub use codec::LineCodec;
pub use commands::{AckMatcher, DeviceCommand, parse_calibration_reply};
pub use inbound::{InboundLine, classify, is_ready_marker, is_sms_marker};
pub use servo::{clamp_speed, servo_value_for_speed};
pub use telemetry::{TelemetryFrame, looks_like_object, parse_snapshot};
