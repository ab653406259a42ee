//! Cadence Playback
//!
//! Playlist management and the decode-ahead player engine.
//!
//! This crate provides:
//! - `Playlist`: ordered items with stable, validated handles
//! - `Player`: background decode and output threads driving an `AudioSink`
//! - `EventChannel`: bounded queue of `NowPlaying` / `BufferUnderrun` events
//! - `NullSink`: real-time paced sink for headless playback
//!
//! # Architecture
//!
//! The player never talks to a device directly. Output goes through the
//! `AudioSink` trait from `cadence-core`; `cadence-audio-desktop` provides
//! the CPAL implementation.
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_core::AudioFormat;
//! use cadence_playback::{NullSink, Player, PlayerConfig, PlayerEvent};
//!
//! # fn example() -> cadence_core::Result<()> {
//! let player = Player::new(
//!     Box::new(NullSink::new(AudioFormat::cd_quality())),
//!     PlayerConfig::default(),
//! )?;
//!
//! let song = cadence_audio::open("/music/song.flac")?;
//! player.insert(song, -3.5, None)?;
//! player.play();
//!
//! while let Some(event) = player.event_wait() {
//!     if event == PlayerEvent::NowPlaying {
//!         let (item, secs) = player.position();
//!         println!("now playing {item:?} at {secs:.1}s");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod events;
pub mod player;
pub mod playlist;
pub mod sink;

pub use config::PlayerConfig;
pub use error::{PlaybackError, Result};
pub use events::{EventChannel, PlayerEvent};
pub use player::Player;
pub use playlist::{ItemId, Playlist, PlaylistItem};
pub use sink::NullSink;
