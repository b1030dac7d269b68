use parcelbox_hardware::DeviceError;
use thiserror::Error;

/// Failures of the kiosk-side collaborators.
///
/// Device faults are carried through unchanged so callers can still match on
/// the [`DeviceError`] taxonomy.
#[derive(Debug, Error)]
pub enum KioskError {
    /// Reading or writing the kiosk configuration file failed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The device rejected or failed an operation
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The HTTP SMS gateway refused or failed a message
    #[error("SMS gateway error: {0}")]
    Gateway(String),

    /// Push notification fan-out failed
    #[error("Notification error: {0}")]
    Notifier(String),
}

/// Specialized result type for kiosk operations
pub type KioskResult<T> = Result<T, KioskError>;
