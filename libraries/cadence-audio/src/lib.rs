//! Cadence Audio
//!
//! Concrete backends for the core capability traits plus the decode
//! pipeline shared by the player and the gain scanner.
//!
//! This crate provides:
//! - Audio decoding via Symphonia (MP3, FLAC, OGG, WAV, AAC)
//! - Tag reading and writing via lofty
//! - `DecodePipeline`: lazy, timestamped PCM with channel mapping and
//!   rubato resampling to an output format
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_audio::{DecodePipeline, PipelineOptions};
//!
//! # fn example() -> cadence_core::Result<()> {
//! let file = cadence_audio::open("/music/song.flac")?;
//! println!("{:.1}s, {} tags", file.duration()?, file.tags().len());
//!
//! for buffer in DecodePipeline::open(&file, PipelineOptions::default())? {
//!     let buffer = buffer?;
//!     println!("{:.3}s: peak {:.3}", buffer.pts, buffer.peak());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod decoder;
mod error;
pub mod pipeline;
mod resample;
mod tags;

pub use decoder::{SymphoniaDecoder, SymphoniaStream};
pub use error::{AudioError, Result};
pub use pipeline::{remap_channels, DecodePipeline, PipelineOptions};
pub use resample::Resampler;
pub use tags::LoftyTagStore;

use cadence_core::{AudioFile, SourceHandle};
use std::path::Path;
use std::sync::Arc;

/// Open a file with the Symphonia decoder and the lofty tag store
///
/// # Errors
/// Returns `Io` if the file is missing and `Decode` if no decodable audio
/// track is found
pub fn open(path: impl AsRef<Path>) -> cadence_core::Result<SourceHandle> {
    AudioFile::open(
        path,
        Arc::new(SymphoniaDecoder::new()),
        Arc::new(LoftyTagStore::new()),
    )
}
