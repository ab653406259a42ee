//! Error types for playlist and player operations

use crate::playlist::ItemId;
use cadence_core::CadenceError;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The item was created by a different playlist
    #[error("Item {0} belongs to another playlist")]
    ForeignItem(ItemId),

    /// The item has already been removed
    #[error("Item {0} is no longer in the playlist")]
    StaleItem(ItemId),

    /// Invalid player configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be started
    #[error("Failed to start {name} thread: {source}")]
    ThreadSpawn {
        /// Thread name
        name: &'static str,
        /// Underlying OS error
        source: std::io::Error,
    },
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

impl From<PlaybackError> for CadenceError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::ForeignItem(_) | PlaybackError::StaleItem(_) => {
                CadenceError::invalid_reference(err.to_string())
            }
            PlaybackError::InvalidConfig(msg) => CadenceError::config(msg),
            PlaybackError::ThreadSpawn { .. } => CadenceError::io(err.to_string()),
        }
    }
}
