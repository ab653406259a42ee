/// Audio backend errors
use cadence_core::CadenceError;
use thiserror::Error;

/// Result type alias using `AudioError`
pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio backend error types
#[derive(Error, Debug)]
pub enum AudioError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// No decodable audio track in the container
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Decoding error
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Seek error
    #[error("Seek error: {0}")]
    SeekError(String),

    /// Sample rate conversion failed
    #[error("Resampling error: {0}")]
    Resampling(String),

    /// Tag read or write failed
    #[error("Tag error: {0}")]
    Tag(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Symphonia error
    #[error("Symphonia error: {0}")]
    Symphonia(String),
}

impl From<symphonia::core::errors::Error> for AudioError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error;
        match err {
            Error::IoError(e) => Self::Io(e),
            Error::Unsupported(what) => Self::UnsupportedFormat(what.to_string()),
            Error::DecodeError(what) => Self::DecodeError(what.to_string()),
            Error::SeekError(kind) => Self::SeekError(format!("{kind:?}")),
            other => Self::Symphonia(other.to_string()),
        }
    }
}

impl From<lofty::error::LoftyError> for AudioError {
    fn from(err: lofty::error::LoftyError) -> Self {
        Self::Tag(err.to_string())
    }
}

impl From<AudioError> for CadenceError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::FileNotFound(_) | AudioError::Io(_) | AudioError::Tag(_) => {
                CadenceError::io(err.to_string())
            }
            _ => CadenceError::decode(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_map_to_io() {
        let err: CadenceError = AudioError::FileNotFound("/x.flac".into()).into();
        assert!(matches!(err, CadenceError::Io(_)));
    }

    #[test]
    fn codec_failures_map_to_decode() {
        let err: CadenceError = AudioError::UnsupportedFormat("no track".into()).into();
        assert!(matches!(err, CadenceError::Decode(_)));
    }
}
