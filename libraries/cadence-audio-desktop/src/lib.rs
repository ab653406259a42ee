//! Desktop audio output for Cadence using CPAL
//!
//! This crate provides `CpalSink`, the `AudioSink` implementation for the
//! system's default output device.
//!
//! # Features
//!
//! - Cross-platform audio output using CPAL
//! - Backpressure through a bounded sample queue
//! - Channel mapping to the device layout
//! - Process-wide device exclusivity
//!
//! # Example
//!
//! ```no_run
//! use cadence_audio_desktop::CpalSink;
//! use cadence_core::AudioSink;
//! use cadence_playback::{Player, PlayerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = CpalSink::open()?;
//! let config = PlayerConfig {
//!     output_format: sink.format(),
//!     ..PlayerConfig::default()
//! };
//! let player = Player::new(Box::new(sink), config)?;
//! player.insert(cadence_audio::open("/music/song.flac")?, 0.0, None)?;
//! player.play();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod sink;

pub use error::{OutputError, Result};
pub use sink::CpalSink;
