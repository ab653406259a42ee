//! ReplayGain 2.0 calculation
//!
//! ReplayGain 2.0 is based on EBU R128 loudness measurement and uses
//! -18 LUFS as the reference level.
//!
//! # Gain Calculation
//!
//! - Track Gain = Reference Level - Track Integrated Loudness
//! - Album Gain = Reference Level - Loudness of all tracks as one program
//!
//! A program with no gated loudness (silence, or shorter than one 400 ms
//! block) gets unity gain.
//!
//! # Peak Values
//!
//! Peaks are linear sample magnitudes. If `gain * peak > 1.0` the
//! adjusted signal clips.

use crate::analyzer::{LoudnessAnalyzer, LoudnessInfo};
use crate::error::Result;
use crate::REPLAYGAIN_REFERENCE_LUFS;
use cadence_core::{db_to_gain, gain_to_db};

/// Track-level ReplayGain information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackGain {
    /// Gain to apply in dB (negative for loud tracks)
    pub gain_db: f64,
    /// Sample peak, linear
    pub peak: f64,
    /// Measured integrated loudness in LUFS
    pub integrated_lufs: Option<f64>,
    /// Reference level used for calculation
    pub reference_lufs: f64,
}

impl TrackGain {
    /// Check if applying this gain would cause clipping
    pub fn would_clip(&self) -> bool {
        self.linear_gain() * self.peak > 1.0
    }

    /// Gain limited so the peak stays at or below full scale
    pub fn safe_gain(&self) -> f64 {
        self.gain_db.min(-gain_to_db(self.peak))
    }

    /// Gain as a linear multiplier
    pub fn linear_gain(&self) -> f64 {
        db_to_gain(self.gain_db)
    }
}

/// Album-level ReplayGain information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbumGain {
    /// Gain to apply in dB for album normalization
    pub gain_db: f64,
    /// Maximum sample peak across all tracks, linear
    pub peak: f64,
    /// Loudness of all tracks as one program in LUFS
    pub loudness_lufs: Option<f64>,
    /// Number of tracks analyzed
    pub track_count: usize,
    /// Reference level used for calculation
    pub reference_lufs: f64,
}

impl AlbumGain {
    /// Check if applying this gain would cause clipping on any track
    pub fn would_clip(&self) -> bool {
        self.linear_gain() * self.peak > 1.0
    }

    /// Gain limited so the peak stays at or below full scale
    pub fn safe_gain(&self) -> f64 {
        self.gain_db.min(-gain_to_db(self.peak))
    }

    /// Gain as a linear multiplier
    pub fn linear_gain(&self) -> f64 {
        db_to_gain(self.gain_db)
    }
}

/// Calculator for ReplayGain values
#[derive(Debug, Clone, Copy)]
pub struct ReplayGainCalculator {
    reference_lufs: f64,
}

impl ReplayGainCalculator {
    /// Calculator with the ReplayGain 2.0 reference level (-18 LUFS)
    pub fn new() -> Self {
        Self {
            reference_lufs: REPLAYGAIN_REFERENCE_LUFS,
        }
    }

    /// Calculator with a custom reference level in LUFS
    pub fn with_reference(reference_lufs: f64) -> Self {
        Self { reference_lufs }
    }

    /// Reference level in LUFS
    pub fn reference_lufs(&self) -> f64 {
        self.reference_lufs
    }

    fn gain_db(&self, lufs: Option<f64>) -> f64 {
        lufs.map_or(0.0, |lufs| self.reference_lufs - lufs)
    }

    /// Track gain from one program's measurements
    pub fn track_gain(&self, info: &LoudnessInfo) -> TrackGain {
        TrackGain {
            gain_db: self.gain_db(info.integrated_lufs),
            peak: info.sample_peak,
            integrated_lufs: info.integrated_lufs,
            reference_lufs: self.reference_lufs,
        }
    }

    /// Album gain over every analyzer, or `None` if there are none
    ///
    /// Loudness is measured over the analyzers' combined gating histograms,
    /// not averaged from the per-track values.
    pub fn album_gain(&self, tracks: &[LoudnessAnalyzer]) -> Result<Option<AlbumGain>> {
        if tracks.is_empty() {
            return Ok(None);
        }

        let loudness_lufs = LoudnessAnalyzer::combined_loudness(tracks)?;
        let mut peak = 0.0_f64;
        for track in tracks {
            peak = peak.max(track.sample_peak()?);
        }

        Ok(Some(AlbumGain {
            gain_db: self.gain_db(loudness_lufs),
            peak,
            loudness_lufs,
            track_count: tracks.len(),
            reference_lufs: self.reference_lufs,
        }))
    }
}

impl Default for ReplayGainCalculator {
    fn default() -> Self {
        Self::new()
    }
}
