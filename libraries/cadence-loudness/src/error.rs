//! Error types for loudness analysis

use cadence_core::CadenceError;
use thiserror::Error;

/// Result type for loudness operations
pub type Result<T> = std::result::Result<T, LoudnessError>;

/// Errors that can occur during loudness analysis
#[derive(Error, Debug)]
pub enum LoudnessError {
    /// Sample rate or channel count the analyzer cannot handle
    #[error("Unsupported format for analysis: {sample_rate} Hz, {channels} channels")]
    UnsupportedFormat {
        /// Sample rate in Hz
        sample_rate: u32,
        /// Channel count
        channels: u16,
    },

    /// EBU R128 analysis error
    #[error("EBU R128 analysis failed: {0}")]
    Analysis(String),

    /// Invalid scan configuration
    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),

    /// Failure opening or decoding a source
    #[error(transparent)]
    Source(#[from] CadenceError),
}

impl From<ebur128::Error> for LoudnessError {
    fn from(err: ebur128::Error) -> Self {
        Self::Analysis(format!("{err:?}"))
    }
}

impl From<LoudnessError> for CadenceError {
    fn from(err: LoudnessError) -> Self {
        match err {
            LoudnessError::Source(e) => e,
            LoudnessError::InvalidConfig(msg) => CadenceError::config(msg),
            other => CadenceError::decode(other.to_string()),
        }
    }
}
