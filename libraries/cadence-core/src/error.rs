/// Core error types for Cadence
use thiserror::Error;

/// Result type alias using `CadenceError`
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Core error type for Cadence
///
/// Every backend crate converts its own error enum into this one, so callers
/// of the player and the gain scanner only ever match on these classes.
#[derive(Error, Debug)]
pub enum CadenceError {
    /// An item or source handle does not belong to the structure it was passed to
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Operation not permitted in the current lifecycle phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The decoder capability failed for a source
    #[error("Decode error: {0}")]
    Decode(String),

    /// Opening a source or saving its tags failed
    #[error("IO error: {0}")]
    Io(String),

    /// A scan was stopped early by request
    #[error("Operation aborted")]
    Aborted,

    /// The output device could not be opened or is already claimed
    #[error("Output device error: {0}")]
    Device(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CadenceError {
    /// Create an invalid reference error
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an I/O error
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an output device error
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether playback or scanning can skip the affected source and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Io(_))
    }
}

impl From<std::io::Error> for CadenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
