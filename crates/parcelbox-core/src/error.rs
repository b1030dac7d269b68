use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid SMS body: {0}")]
    InvalidSmsBody(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // Wire errors
    #[error("Invalid telemetry frame: {0}")]
    InvalidTelemetry(String),

    #[error("Invalid device reply: {0}")]
    InvalidReply(String),

    #[error("Line too large: {size} bytes (max: {max_size})")]
    LineTooLarge { size: usize, max_size: usize },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

impl Error {
    /// Returns `true` for errors caused by caller input rather than the wire.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidChannel(_)
                | Error::InvalidPhoneNumber(_)
                | Error::InvalidSmsBody(_)
                | Error::InvalidValue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
