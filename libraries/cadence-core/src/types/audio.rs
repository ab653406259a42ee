/// Audio-related types
use serde::{Deserialize, Serialize};

/// Sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// Common sample rates
    pub const CD_QUALITY: Self = Self(44_100);
    pub const DVD_QUALITY: Self = Self(48_000);

    /// Create a new sample rate
    #[must_use]
    pub fn new(hz: u32) -> Self {
        Self(hz)
    }

    /// Get the sample rate as Hz
    pub fn as_hz(&self) -> u32 {
        self.0
    }
}

/// PCM layout of decoded audio: rate and interleaved channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate
    pub sample_rate: SampleRate,

    /// Number of channels (1 = mono, 2 = stereo, etc.)
    pub channels: u16,
}

impl AudioFormat {
    /// Create a new audio format
    pub fn new(sample_rate: SampleRate, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// CD quality stereo (44.1kHz, 2 channels), the default output format
    pub fn cd_quality() -> Self {
        Self::new(SampleRate::CD_QUALITY, 2)
    }

    /// Duration in seconds of `frames` audio frames at this rate
    pub fn frames_to_secs(&self, frames: usize) -> f64 {
        frames as f64 / f64::from(self.sample_rate.as_hz())
    }

    /// Number of whole audio frames covering `secs` seconds
    pub fn secs_to_frames(&self, secs: f64) -> usize {
        (secs.max(0.0) * f64::from(self.sample_rate.as_hz())).round() as usize
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::cd_quality()
    }
}

/// A block of decoded PCM
///
/// Samples are f32 in the range [-1.0, 1.0], interleaved `[L, R, L, R, ...]`.
/// `pts` is the presentation time of the first frame, in seconds from the
/// start of the source it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Audio samples (f32, interleaved)
    pub samples: Vec<f32>,

    /// Audio format information
    pub format: AudioFormat,

    /// Timestamp of the first frame in seconds
    pub pts: f64,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(samples: Vec<f32>, format: AudioFormat, pts: f64) -> Self {
        Self {
            samples,
            format,
            pts,
        }
    }

    /// A buffer of silence lasting `frames` frames
    pub fn silence(frames: usize, format: AudioFormat, pts: f64) -> Self {
        Self::new(vec![0.0; frames * format.channels as usize], format, pts)
    }

    /// Get the number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    /// Get the duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.format.frames_to_secs(self.frames())
    }

    /// Timestamp just past the last frame
    pub fn end_pts(&self) -> f64 {
        self.pts + self.duration_secs()
    }

    /// Multiply every sample by `gain`
    pub fn apply_gain(&mut self, gain: f32) {
        if gain != 1.0 {
            for sample in &mut self.samples {
                *sample *= gain;
            }
        }
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the length in samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }
}
