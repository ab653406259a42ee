//! EBU R128 loudness analysis
//!
//! Wraps the `ebur128` crate in histogram mode so the gating state of many
//! analyzers can be combined afterwards into one program loudness. Measures:
//! - Integrated loudness (LUFS), K-weighted and gated per ITU-R BS.1770
//! - Sample peak (linear), the maximum absolute sample over all channels

use crate::error::{LoudnessError, Result};
use cadence_core::{AudioBuffer, AudioFormat};
use ebur128::{EbuR128, Mode};
use std::fmt;

/// Loudness characteristics of one analyzed program
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessInfo {
    /// Integrated loudness in LUFS
    /// `None` when no block passed the gate (silence or under 400 ms)
    pub integrated_lufs: Option<f64>,

    /// Maximum absolute sample value (1.0 = full scale)
    pub sample_peak: f64,

    /// Duration of the analyzed audio in seconds
    pub duration_seconds: f64,
}

impl fmt::Display for LoudnessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.integrated_lufs {
            Some(lufs) => write!(f, "Loudness: {lufs:.1} LUFS")?,
            None => write!(f, "Loudness: silent")?,
        }
        write!(
            f,
            ", Sample Peak: {:.6}, Duration: {:.1}s",
            self.sample_peak, self.duration_seconds
        )
    }
}

/// EBU R128 loudness analyzer
///
/// # Example
///
/// ```
/// use cadence_core::{AudioBuffer, AudioFormat};
/// use cadence_loudness::LoudnessAnalyzer;
///
/// let format = AudioFormat::cd_quality();
/// let mut analyzer = LoudnessAnalyzer::new(format).unwrap();
/// analyzer.add_buffer(&AudioBuffer::new(vec![0.25; 44_100 * 2], format, 0.0)).unwrap();
///
/// let info = analyzer.info().unwrap();
/// assert_eq!(info.sample_peak, 0.25);
/// ```
pub struct LoudnessAnalyzer {
    ebur128: EbuR128,
    format: AudioFormat,
    frames: usize,
}

impl LoudnessAnalyzer {
    /// Create an analyzer for interleaved PCM in `format`
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` outside 8-384 kHz or 1-8 channels
    pub fn new(format: AudioFormat) -> Result<Self> {
        let sample_rate = format.sample_rate.as_hz();
        if !(8000..=384_000).contains(&sample_rate) || !(1..=8).contains(&format.channels) {
            return Err(LoudnessError::UnsupportedFormat {
                sample_rate,
                channels: format.channels,
            });
        }

        // HISTOGRAM keeps gating state combinable across analyzers
        let mode = Mode::I | Mode::SAMPLE_PEAK | Mode::HISTOGRAM;
        let ebur128 = EbuR128::new(u32::from(format.channels), sample_rate, mode)?;

        Ok(Self {
            ebur128,
            format,
            frames: 0,
        })
    }

    /// Format this analyzer was created for
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Feed interleaved samples
    pub fn add_frames(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.format.channels);
        if samples.len() % channels != 0 {
            return Err(LoudnessError::Analysis(format!(
                "Sample count {} is not divisible by channel count {}",
                samples.len(),
                channels
            )));
        }

        self.ebur128.add_frames_f32(samples)?;
        self.frames += samples.len() / channels;
        Ok(())
    }

    /// Feed a decoded buffer
    ///
    /// # Errors
    /// Returns `Analysis` if the buffer's format differs from the analyzer's
    pub fn add_buffer(&mut self, buffer: &AudioBuffer) -> Result<()> {
        if buffer.format != self.format {
            return Err(LoudnessError::Analysis(format!(
                "Buffer format {:?} does not match analyzer format {:?}",
                buffer.format, self.format
            )));
        }
        self.add_frames(&buffer.samples)
    }

    /// Frames analyzed so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Seconds of audio analyzed so far
    pub fn duration_secs(&self) -> f64 {
        self.format.frames_to_secs(self.frames)
    }

    /// Integrated loudness, `None` if nothing passed the gate
    pub fn loudness(&self) -> Result<Option<f64>> {
        let lufs = self.ebur128.loudness_global()?;
        Ok(lufs.is_finite().then_some(lufs))
    }

    /// Maximum absolute sample value over all channels
    pub fn sample_peak(&self) -> Result<f64> {
        let mut peak = 0.0_f64;
        for channel in 0..u32::from(self.format.channels) {
            peak = peak.max(self.ebur128.sample_peak(channel)?);
        }
        Ok(peak)
    }

    /// Snapshot of the current measurements
    pub fn info(&self) -> Result<LoudnessInfo> {
        Ok(LoudnessInfo {
            integrated_lufs: self.loudness()?,
            sample_peak: self.sample_peak()?,
            duration_seconds: self.duration_secs(),
        })
    }

    /// Loudness of every analyzed program played back to back
    ///
    /// Combines the gating histograms rather than averaging per-program
    /// results, so quiet passages are gated against the whole set.
    pub fn combined_loudness<'a>(
        analyzers: impl IntoIterator<Item = &'a LoudnessAnalyzer>,
    ) -> Result<Option<f64>> {
        let lufs = EbuR128::loudness_global_multiple(
            analyzers.into_iter().map(|analyzer| &analyzer.ebur128),
        )?;
        Ok(lufs.is_finite().then_some(lufs))
    }
}

impl fmt::Debug for LoudnessAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoudnessAnalyzer")
            .field("format", &self.format)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}
