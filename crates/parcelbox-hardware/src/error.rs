//! Error types for bridge and lock operations.
//!
//! Every hardware operation resolves with one of these variants. None of them
//! is fatal to the process except [`DeviceError::LinkLost`], which is only
//! produced when a previously healthy serial link cannot be re-established.

use std::time::Duration;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur during bridge and lock operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// Caller input was rejected before anything was sent.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// No link (real or synthetic) is available.
    #[error("Not connected")]
    NotConnected,

    /// Writing to the link or GPIO failed.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The bridge answered with an explicit error line.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// No matching reply arrived in time.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A lock sequence is already running on the channel.
    #[error("Lock sequence already active on channel {channel}")]
    SequenceConflict { channel: usize },

    /// The channel is not in a state that allows the operation.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// The serial link was lost and could not be re-established.
    #[error("Link lost: {message}")]
    LinkLost { message: String },
}

impl DeviceError {
    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a new sequence conflict error.
    pub fn sequence_conflict(channel: usize) -> Self {
        Self::SequenceConflict { channel }
    }

    /// Create a new precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Create a new link lost error.
    pub fn link_lost(message: impl Into<String>) -> Self {
        Self::LinkLost {
            message: message.into(),
        }
    }

    /// Returns `true` for timeout errors.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<parcelbox_core::Error> for DeviceError {
    fn from(error: parcelbox_core::Error) -> Self {
        use parcelbox_core::Error;

        match error {
            Error::InvalidTelemetry(_) | Error::InvalidReply(_) | Error::LineTooLarge { .. } => {
                Self::protocol(error.to_string())
            }
            Error::Io(e) => Self::transport(e.to_string()),
            other => Self::validation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(error: std::io::Error) -> Self {
        Self::transport(error.to_string())
    }
}

impl From<serialport::Error> for DeviceError {
    fn from(error: serialport::Error) -> Self {
        Self::transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let error = DeviceError::timeout(Duration::from_secs(30));
        assert!(error.is_timeout());
        assert_eq!(error.to_string(), "Operation timeout after 30000ms");
    }

    #[test]
    fn test_sequence_conflict_error() {
        let error = DeviceError::sequence_conflict(2);
        assert_eq!(error.to_string(), "Lock sequence already active on channel 2");
    }

    #[test]
    fn test_core_validation_maps_to_validation() {
        let core = parcelbox_core::PhoneNumber::new("12").unwrap_err();
        assert!(matches!(
            DeviceError::from(core),
            DeviceError::Validation { .. }
        ));
    }

    #[test]
    fn test_core_reply_error_maps_to_protocol() {
        let core = parcelbox_core::Error::InvalidReply("GETCAL:x".into());
        assert!(matches!(
            DeviceError::from(core),
            DeviceError::Protocol { .. }
        ));
    }

    #[test]
    fn test_io_error_maps_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(
            DeviceError::from(io),
            DeviceError::Transport { .. }
        ));
    }
}
