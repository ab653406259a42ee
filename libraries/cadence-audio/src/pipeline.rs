//! Decode pipeline: a lazy sequence of PCM frames from one source
//!
//! The pipeline opens its own decode cursor over a source handle, seeks to
//! the requested start offset and yields timestamped buffers. With a target
//! format it also remaps channels and resamples so every yielded buffer
//! matches the output device.

use crate::resample::Resampler;
use cadence_core::{AudioBuffer, AudioFile, AudioFormat, DecodeStream, Result};
use tracing::{debug, trace};

/// ITU-R BS.775 coefficient for centre and surround channels (-3 dB)
const SURROUND_MIX: f32 = 0.707;

/// How to open a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineOptions {
    /// Offset into the source in seconds
    pub start_secs: f64,
    /// Convert every frame to this format; `None` keeps the native format
    pub target: Option<AudioFormat>,
}

impl PipelineOptions {
    /// Start at `start_secs` in the native format
    pub fn at(start_secs: f64) -> Self {
        Self {
            start_secs,
            target: None,
        }
    }

    /// Convert to `format`
    #[must_use]
    pub fn with_target(mut self, format: AudioFormat) -> Self {
        self.target = Some(format);
        self
    }
}

/// Lazy frame producer over one source
pub struct DecodePipeline {
    stream: Box<dyn DecodeStream>,
    source_format: AudioFormat,
    output_format: AudioFormat,
    resampler: Option<Resampler>,
    /// Position of the first produced frame
    start_pts: f64,
    /// Frames handed out so far, in the output format
    produced_frames: usize,
    finished: bool,
}

impl DecodePipeline {
    /// Open a pipeline over `file`
    ///
    /// # Errors
    /// Returns `Io`/`Decode` if the source cannot be opened or sought
    pub fn open(file: &AudioFile, options: PipelineOptions) -> Result<Self> {
        let mut stream = file.open_stream()?;
        let source_format = stream.format();
        let output_format = options.target.unwrap_or(source_format);

        let start_pts = if options.start_secs > 0.0 {
            stream.seek(options.start_secs)?
        } else {
            0.0
        };

        let resampler = if source_format.sample_rate == output_format.sample_rate {
            None
        } else {
            Some(Resampler::new(
                source_format.sample_rate.as_hz(),
                output_format.sample_rate.as_hz(),
                output_format.channels as usize,
            )?)
        };

        debug!(
            path = %file.path().display(),
            start = start_pts,
            from_rate = source_format.sample_rate.as_hz(),
            to_rate = output_format.sample_rate.as_hz(),
            from_channels = source_format.channels,
            to_channels = output_format.channels,
            "Opened decode pipeline"
        );

        Ok(Self {
            stream,
            source_format,
            output_format,
            resampler,
            start_pts,
            produced_frames: 0,
            finished: false,
        })
    }

    /// Format of every yielded buffer
    pub fn output_format(&self) -> AudioFormat {
        self.output_format
    }

    /// Source position just past the last yielded frame
    pub fn next_pts(&self) -> f64 {
        self.start_pts + self.output_format.frames_to_secs(self.produced_frames)
    }

    /// Whether the end of the source has been reached
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn emit(&mut self, samples: Vec<f32>) -> Option<AudioBuffer> {
        if samples.is_empty() {
            return None;
        }
        let buffer = AudioBuffer::new(samples, self.output_format, self.next_pts());
        self.produced_frames += buffer.frames();
        trace!(pts = buffer.pts, frames = buffer.frames(), "Decoded frame");
        Some(buffer)
    }

    fn convert(&mut self, buffer: &AudioBuffer) -> Result<Vec<f32>> {
        let mapped = remap_channels(
            &buffer.samples,
            self.source_format.channels as usize,
            self.output_format.channels as usize,
        );
        match self.resampler.as_mut() {
            Some(resampler) => Ok(resampler.process(&mapped)?),
            None => Ok(mapped),
        }
    }

    fn finish(&mut self) -> Result<Vec<f32>> {
        self.finished = true;
        match self.resampler.as_mut() {
            Some(resampler) => Ok(resampler.flush()?),
            None => Ok(Vec::new()),
        }
    }
}

impl Iterator for DecodePipeline {
    type Item = Result<AudioBuffer>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.stream.next_frame() {
                Ok(Some(buffer)) => match self.convert(&buffer) {
                    Ok(samples) => {
                        if let Some(out) = self.emit(samples) {
                            return Some(Ok(out));
                        }
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                },
                Ok(None) => {
                    return match self.finish() {
                        Ok(tail) => self.emit(tail).map(Ok),
                        Err(e) => Some(Err(e)),
                    };
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Map interleaved samples from `from` channels to `to` channels
///
/// Mono is duplicated to every output channel, multichannel is downmixed to
/// stereo (L, R, C, LFE, SL, SR order) and anything else keeps the leading
/// channels, padding with silence.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        match (from, to) {
            (1, _) => output.extend(std::iter::repeat(frame[0]).take(to)),
            (_, 1) => output.push(frame.iter().sum::<f32>() / from as f32),
            (channels, 2) if channels > 2 => {
                let (l, r) = downmix_stereo(frame);
                output.push(l);
                output.push(r);
            }
            _ => output.extend((0..to).map(|ch| frame.get(ch).copied().unwrap_or(0.0))),
        }
    }
    output
}

fn downmix_stereo(frame: &[f32]) -> (f32, f32) {
    let channel = |i: usize| frame.get(i).copied().unwrap_or(0.0);
    let (l, r) = (channel(0), channel(1));
    let centre = channel(2) * SURROUND_MIX;
    let (sl, sr) = match frame.len() {
        3 => (0.0, 0.0),
        4 => (channel(2) * SURROUND_MIX, channel(3) * SURROUND_MIX),
        5 => (channel(3) * SURROUND_MIX, channel(4) * SURROUND_MIX),
        _ => (channel(4) * SURROUND_MIX, channel(5) * SURROUND_MIX),
    };
    // Quad has no centre channel
    let centre = if frame.len() == 4 { 0.0 } else { centre };
    (
        (l + centre + sl).clamp(-1.0, 1.0),
        (r + centre + sr).clamp(-1.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::testing::{MemoryTagStore, SyntheticDecoder, SyntheticSource};
    use cadence_core::{SampleRate, SourceHandle};
    use std::sync::Arc;

    fn open_source(source: SyntheticSource) -> SourceHandle {
        let decoder = Arc::new(SyntheticDecoder::new());
        decoder.add("/a", source);
        AudioFile::open("/a", decoder, Arc::new(MemoryTagStore::new())).unwrap()
    }

    #[test]
    fn native_pipeline_is_contiguous() {
        let file = open_source(SyntheticSource::constant(0.5, 0.5));
        let pipeline = DecodePipeline::open(&file, PipelineOptions::default()).unwrap();

        let mut expected_pts = 0.0;
        let mut frames = 0;
        for buffer in pipeline {
            let buffer = buffer.unwrap();
            assert!((buffer.pts - expected_pts).abs() < 1e-9);
            expected_pts = buffer.end_pts();
            frames += buffer.frames();
        }
        assert_eq!(frames, 22_050);
    }

    #[test]
    fn next_pts_follows_yielded_frames() {
        let file = open_source(SyntheticSource::constant(0.5, 1.0));
        let mut pipeline = DecodePipeline::open(&file, PipelineOptions::at(0.25)).unwrap();
        assert!((pipeline.next_pts() - 0.25).abs() < 1e-9);

        let first = pipeline.next().unwrap().unwrap();
        assert!((pipeline.next_pts() - first.end_pts()).abs() < 1e-9);
        let second = pipeline.next().unwrap().unwrap();
        assert!((second.pts - first.end_pts()).abs() < 1e-9);
    }

    #[test]
    fn start_offset_sets_first_pts() {
        let file = open_source(SyntheticSource::constant(0.5, 2.0));
        let mut pipeline = DecodePipeline::open(&file, PipelineOptions::at(1.5)).unwrap();
        let first = pipeline.next().unwrap().unwrap();
        assert!((first.pts - 1.5).abs() < 1e-9);
    }

    #[test]
    fn mono_is_expanded_and_resampled_to_target() {
        let mono = AudioFormat::new(SampleRate::DVD_QUALITY, 1);
        let file = open_source(SyntheticSource::constant(0.5, 1.0).with_format(mono));
        let options = PipelineOptions::default().with_target(AudioFormat::cd_quality());
        let pipeline = DecodePipeline::open(&file, options).unwrap();

        let mut frames = 0;
        for buffer in pipeline {
            let buffer = buffer.unwrap();
            assert_eq!(buffer.format, AudioFormat::cd_quality());
            frames += buffer.frames();
        }
        assert!((frames as i64 - 44_100).abs() <= 1, "got {frames} frames");
    }

    #[test]
    fn decode_errors_end_the_pipeline() {
        let file = open_source(SyntheticSource::constant(0.5, 1.0).failing_after(2048));
        let results: Vec<_> = DecodePipeline::open(&file, PipelineOptions::default())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[test]
    fn downmix_five_one_to_stereo() {
        let frame = [0.1, 0.2, 0.3, 0.0, 0.1, 0.1];
        let out = remap_channels(&frame, 6, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - (0.1 + 0.3 * 0.707 + 0.1 * 0.707)).abs() < 1e-6);
    }

    #[test]
    fn mono_duplicates_and_stereo_averages() {
        assert_eq!(remap_channels(&[0.5, 0.25], 1, 2), vec![0.5, 0.5, 0.25, 0.25]);
        assert_eq!(remap_channels(&[0.5, 0.25], 2, 1), vec![0.375]);
    }
}
