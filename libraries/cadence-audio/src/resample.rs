//! Sample rate conversion with rubato
//!
//! Wraps a `SincFixedIn` resampler behind an interleaved-in, interleaved-out
//! interface. Input that does not fill a complete chunk is held back until
//! more arrives or the stream is flushed.

use crate::error::{AudioError, Result};
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use std::collections::VecDeque;

const CHUNK_FRAMES: usize = 1024;

/// Streaming resampler over interleaved f32 samples
pub struct Resampler {
    inner: SincFixedIn<f32>,
    channels: usize,
    /// Input samples not yet forming a complete chunk
    input_buffer: VecDeque<f32>,
    /// Leading output frames still to drop to compensate filter delay
    pending_delay: usize,
    ratio: f64,
    frames_in: u64,
    frames_out: u64,
}

impl Resampler {
    /// Create a resampler converting `input_rate` to `output_rate`
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(AudioError::Resampling(format!(
                "invalid rates {input_rate} -> {output_rate}"
            )));
        }
        if channels == 0 {
            return Err(AudioError::Resampling("zero channels".to_string()));
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = f64::from(output_rate) / f64::from(input_rate);
        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels)
            .map_err(|e| AudioError::Resampling(format!("SincFixedIn creation failed: {e}")))?;

        Ok(Self {
            pending_delay: inner.output_delay(),
            inner,
            channels,
            input_buffer: VecDeque::new(),
            ratio,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Feed interleaved input, returning whatever output is ready
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() % self.channels != 0 {
            return Err(AudioError::Resampling(format!(
                "input of {} samples is not a multiple of {} channels",
                input.len(),
                self.channels
            )));
        }
        self.input_buffer.extend(input.iter().copied());
        self.frames_in += (input.len() / self.channels) as u64;

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next() * self.channels;
            if self.input_buffer.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.input_buffer.drain(..needed).collect();
            let waves = self.deinterleave(&chunk);
            let resampled = self
                .inner
                .process(&waves, None)
                .map_err(|e| AudioError::Resampling(e.to_string()))?;
            self.append_output(resampled, &mut output);
        }
        Ok(output)
    }

    /// Drain held-back input and the filter tail at end of stream
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let mut output = Vec::new();

        let remaining: Vec<f32> = self.input_buffer.drain(..).collect();
        if !remaining.is_empty() {
            let waves = self.deinterleave(&remaining);
            let resampled = self
                .inner
                .process_partial(Some(&waves), None)
                .map_err(|e| AudioError::Resampling(e.to_string()))?;
            self.append_output(resampled, &mut output);
        }

        let tail = self
            .inner
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
        self.append_output(tail, &mut output);

        // Zero padding of the partial chunks produces more than the input covers
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let produced = (output.len() / self.channels) as u64;
        let overshoot = (self.frames_out - expected.min(self.frames_out)).min(produced);
        output.truncate((produced - overshoot) as usize * self.channels);
        self.frames_out -= overshoot;
        Ok(output)
    }

    /// Deinterleave samples from [L, R, L, R, ...] to [[L, L, ...], [R, R, ...]]
    fn deinterleave(&self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        let frames = interleaved.len() / self.channels;
        let mut waves = vec![Vec::with_capacity(frames); self.channels];
        for frame in interleaved.chunks_exact(self.channels) {
            for (wave, sample) in waves.iter_mut().zip(frame) {
                wave.push(*sample);
            }
        }
        waves
    }

    fn append_output(&mut self, waves: Vec<Vec<f32>>, output: &mut Vec<f32>) {
        let frames = waves.first().map_or(0, Vec::len);
        let skip = self.pending_delay.min(frames);
        self.pending_delay -= skip;
        self.frames_out += (frames - skip) as u64;
        output.reserve((frames - skip) * self.channels);
        for frame in skip..frames {
            for wave in &waves {
                output.push(wave[frame]);
            }
        }
    }
}
