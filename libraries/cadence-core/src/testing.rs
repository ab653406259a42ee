//! Test support: synthetic sources and in-memory tag storage
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream crates that need deterministic PCM without real files.

use crate::error::{CadenceError, Result};
use crate::traits::{AudioDecoder, DecodeStream, TagStore};
use crate::types::{AudioBuffer, AudioFormat, Tag};
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Waveform of a synthetic source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Every sample has the same value
    Constant(f32),
    /// Sine with the given frequency (Hz) and peak amplitude
    Sine {
        /// Frequency in Hz
        frequency: f32,
        /// Peak amplitude
        amplitude: f32,
    },
}

/// Description of a synthetic source
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    /// Format of produced buffers
    pub format: AudioFormat,
    /// Length of the source
    pub duration_secs: f64,
    /// Sample generator
    pub waveform: Waveform,
    /// Frames per decoded buffer
    pub chunk_frames: usize,
    /// Fail with a decode error once this many frames have been produced
    pub fail_after_frames: Option<usize>,
    /// Whether the stream reports its duration up front
    pub declares_duration: bool,
}

impl SyntheticSource {
    /// CD-quality stereo source of constant amplitude
    pub fn constant(amplitude: f32, duration_secs: f64) -> Self {
        Self {
            format: AudioFormat::cd_quality(),
            duration_secs,
            waveform: Waveform::Constant(amplitude),
            chunk_frames: 1024,
            fail_after_frames: None,
            declares_duration: true,
        }
    }

    /// CD-quality stereo sine
    pub fn sine(frequency: f32, amplitude: f32, duration_secs: f64) -> Self {
        Self {
            waveform: Waveform::Sine {
                frequency,
                amplitude,
            },
            ..Self::constant(0.0, duration_secs)
        }
    }

    /// Override the PCM format
    #[must_use]
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the buffer size
    #[must_use]
    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    /// Fail with a decode error after `frames` frames
    #[must_use]
    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }

    /// Hide the duration so probing has to decode
    #[must_use]
    pub fn without_declared_duration(mut self) -> Self {
        self.declares_duration = false;
        self
    }

    fn total_frames(&self) -> usize {
        self.format.secs_to_frames(self.duration_secs)
    }
}

/// Decoder serving registered synthetic sources by path
#[derive(Debug, Default)]
pub struct SyntheticDecoder {
    sources: Mutex<HashMap<PathBuf, SyntheticSource>>,
    opened: AtomicUsize,
}

impl SyntheticDecoder {
    /// Create a decoder with no sources
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `path`
    pub fn add(&self, path: impl AsRef<Path>, source: SyntheticSource) {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), source);
    }

    /// Register a constant-amplitude CD-quality source
    pub fn add_constant(&self, path: impl AsRef<Path>, amplitude: f32, duration_secs: f64) {
        self.add(path, SyntheticSource::constant(amplitude, duration_secs));
    }

    /// Number of streams opened so far
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl AudioDecoder for SyntheticDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn DecodeStream>> {
        let source = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| CadenceError::io(format!("no such source: {}", path.display())))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticStream {
            total_frames: source.total_frames(),
            source,
            position: 0,
        }))
    }
}

struct SyntheticStream {
    source: SyntheticSource,
    total_frames: usize,
    position: usize,
}

impl SyntheticStream {
    fn sample_at(&self, frame: usize) -> f32 {
        match self.source.waveform {
            Waveform::Constant(value) => value,
            Waveform::Sine {
                frequency,
                amplitude,
            } => {
                let t = frame as f32 / self.source.format.sample_rate.as_hz() as f32;
                amplitude * (TAU * frequency * t).sin()
            }
        }
    }
}

impl DecodeStream for SyntheticStream {
    fn format(&self) -> AudioFormat {
        self.source.format
    }

    fn duration(&self) -> Option<f64> {
        self.source
            .declares_duration
            .then(|| self.source.format.frames_to_secs(self.total_frames))
    }

    fn format_names(&self) -> Vec<String> {
        vec!["pcm_f32le".to_string()]
    }

    fn next_frame(&mut self) -> Result<Option<AudioBuffer>> {
        if let Some(limit) = self.source.fail_after_frames {
            if self.position >= limit {
                return Err(CadenceError::decode("synthetic decode failure"));
            }
        }
        if self.position >= self.total_frames {
            return Ok(None);
        }

        let frames = self
            .source
            .chunk_frames
            .min(self.total_frames - self.position);
        let channels = self.source.format.channels as usize;
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in self.position..self.position + frames {
            let value = self.sample_at(frame);
            samples.extend(std::iter::repeat(value).take(channels));
        }

        let pts = self.source.format.frames_to_secs(self.position);
        self.position += frames;
        Ok(Some(AudioBuffer::new(samples, self.source.format, pts)))
    }

    fn seek(&mut self, seconds: f64) -> Result<f64> {
        self.position = self
            .source
            .format
            .secs_to_frames(seconds)
            .min(self.total_frames);
        Ok(self.source.format.frames_to_secs(self.position))
    }
}

/// Decoder wrapper that sleeps before producing every buffer
///
/// Simulates a decoder that cannot keep up with real time.
pub struct SlowDecoder {
    inner: Arc<dyn AudioDecoder>,
    delay: Duration,
}

impl SlowDecoder {
    /// Wrap `inner`, sleeping `delay` before every buffer
    pub fn new(inner: Arc<dyn AudioDecoder>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl AudioDecoder for SlowDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn DecodeStream>> {
        Ok(Box::new(SlowStream {
            inner: self.inner.open(path)?,
            delay: self.delay,
        }))
    }
}

struct SlowStream {
    inner: Box<dyn DecodeStream>,
    delay: Duration,
}

impl DecodeStream for SlowStream {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn duration(&self) -> Option<f64> {
        self.inner.duration()
    }

    fn format_names(&self) -> Vec<String> {
        self.inner.format_names()
    }

    fn next_frame(&mut self) -> Result<Option<AudioBuffer>> {
        std::thread::sleep(self.delay);
        self.inner.next_frame()
    }

    fn seek(&mut self, seconds: f64) -> Result<f64> {
        self.inner.seek(seconds)
    }
}

/// Tag store backed by a map, with switchable write failures
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    tags: Mutex<HashMap<PathBuf, Vec<Tag>>>,
    fail_writes: AtomicBool,
}

impl MemoryTagStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entries stored for `path`
    pub fn insert(&self, path: impl AsRef<Path>, tags: Vec<Tag>) {
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), tags);
    }

    /// Entries last saved for `path`
    pub fn get(&self, path: impl AsRef<Path>) -> Vec<Tag> {
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    /// Make subsequent writes fail with `Io`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl TagStore for MemoryTagStore {
    fn read_tags(&self, path: &Path) -> Result<Vec<Tag>> {
        Ok(self.get(path))
    }

    fn write_tags(&self, path: &Path, tags: &[Tag]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CadenceError::io(format!(
                "write refused: {}",
                path.display()
            )));
        }
        self.insert(path, tags.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_stream_covers_duration() {
        let decoder = SyntheticDecoder::new();
        decoder.add("a", SyntheticSource::constant(0.5, 0.1).with_chunk_frames(1000));
        let mut stream = decoder.open(Path::new("a")).unwrap();

        let mut frames = 0;
        let mut last_end = 0.0;
        while let Some(buffer) = stream.next_frame().unwrap() {
            assert!((buffer.pts - last_end).abs() < 1e-9);
            assert_eq!(buffer.peak(), 0.5);
            frames += buffer.frames();
            last_end = buffer.end_pts();
        }
        assert_eq!(frames, 4410);
    }

    #[test]
    fn duration_is_decoded_when_undeclared() {
        let decoder = SyntheticDecoder::new();
        decoder.add("a", SyntheticSource::sine(440.0, 0.8, 0.5).without_declared_duration());
        let secs = decoder.probe_duration(Path::new("a")).unwrap();
        assert!((secs - 0.5).abs() < 1e-3);
    }

    #[test]
    fn seek_clamps_to_end() {
        let decoder = SyntheticDecoder::new();
        decoder.add_constant("a", 0.1, 1.0);
        let mut stream = decoder.open(Path::new("a")).unwrap();
        assert!((stream.seek(5.0).unwrap() - 1.0).abs() < 1e-9);
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn failing_source_reports_decode_error() {
        let decoder = SyntheticDecoder::new();
        decoder.add("a", SyntheticSource::constant(0.1, 1.0).failing_after(0));
        let mut stream = decoder.open(Path::new("a")).unwrap();
        assert!(matches!(stream.next_frame(), Err(CadenceError::Decode(_))));
    }
}
