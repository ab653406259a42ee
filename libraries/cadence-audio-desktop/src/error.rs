/// Audio output errors
use cadence_core::CadenceError;
use thiserror::Error;

/// Result type for output operations
pub type Result<T> = std::result::Result<T, OutputError>;

/// Output errors
#[derive(Debug, Error)]
pub enum OutputError {
    /// Another sink holds the output device
    #[error("output device already in use")]
    DeviceBusy,

    /// Device not found
    #[error("Audio device not found")]
    DeviceNotFound,

    /// Failed to query the device configuration
    #[error("Device configuration error: {0}")]
    Config(String),

    /// Failed to build output stream
    #[error("Failed to build output stream: {0}")]
    StreamBuild(String),

    /// Failed to start the stream
    #[error("Failed to play stream: {0}")]
    Play(String),

    /// Block does not match the device format
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The audio thread could not be started or stopped unexpectedly
    #[error("Audio thread error: {0}")]
    Thread(String),
}

impl From<cpal::BuildStreamError> for OutputError {
    fn from(err: cpal::BuildStreamError) -> Self {
        OutputError::StreamBuild(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for OutputError {
    fn from(err: cpal::PlayStreamError) -> Self {
        OutputError::Play(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for OutputError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        OutputError::Config(err.to_string())
    }
}

impl From<OutputError> for CadenceError {
    fn from(err: OutputError) -> Self {
        CadenceError::device(err.to_string())
    }
}
