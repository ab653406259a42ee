//! Loudness analysis for Cadence
//!
//! This crate provides:
//! - EBU R128 loudness measurement (integrated LUFS, sample peak)
//! - `GainScan`: batch ReplayGain scanning with progress/completion
//!   callbacks, cooperative abort and album aggregation
//! - ReplayGain 2.0 calculation (track and album gain)
//! - ReplayGain tag reading/writing through a source's tag set
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │ SourceHandle │ ──► │ DecodePipeline │ ──► │ LoudnessAnalyzer │ ─┐
//! └──────────────┘     └────────────────┘     └──────────────────┘  │
//!                                                                    ▼
//!                      ┌────────────────┐     ┌──────────────────┐
//!                      │  Tag Writer    │ ◄── │   ScanSummary    │
//!                      └────────────────┘     └──────────────────┘
//! ```
//!
//! Album loudness is measured over the combined gating histograms of every
//! track, as if the album were one continuous program.

#![forbid(unsafe_code)]

mod analyzer;
mod config;
mod error;
mod replaygain;
pub mod scan;
mod tags;

pub use analyzer::{LoudnessAnalyzer, LoudnessInfo};
pub use config::ScanConfig;
pub use error::{LoudnessError, Result};
pub use replaygain::{AlbumGain, ReplayGainCalculator, TrackGain};
pub use scan::{AbortHandle, EntryResult, EntryState, GainScan, ScanSummary};
pub use tags::{
    read_replaygain_tags, remove_replaygain_tags, write_replaygain_tags, ReplayGainTags,
    ALBUM_GAIN_KEY, ALBUM_PEAK_KEY, REFERENCE_LOUDNESS_KEY, TRACK_GAIN_KEY, TRACK_PEAK_KEY,
};

/// ReplayGain 2.0 reference loudness level (-18 LUFS)
pub const REPLAYGAIN_REFERENCE_LUFS: f64 = -18.0;

/// EBU R128 broadcast reference level (-23 LUFS)
pub const EBU_R128_BROADCAST_LUFS: f64 = -23.0;
