//! Sink that discards audio at real-time pace
//!
//! Used for headless playback and tests: it accepts frames no faster than
//! the wall clock would play them, so the player sees the same backpressure
//! a device gives.

use cadence_core::{AudioBuffer, AudioFormat, AudioSink, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Gap after which the pacing clock restarts instead of allowing a burst
const IDLE_RESET: Duration = Duration::from_millis(100);

/// Wall-clock paced sink that drops everything it accepts
#[derive(Debug)]
pub struct NullSink {
    format: AudioFormat,
    /// Frames accepted beyond the wall clock
    headroom_frames: u64,
    clock_start: Option<Instant>,
    last_write: Option<Instant>,
    /// Frames accepted since `clock_start`
    clock_frames: u64,
    written: Arc<AtomicU64>,
}

impl NullSink {
    /// Create a sink for `format` allowing one period of 1024 frames of headroom
    pub fn new(format: AudioFormat) -> Self {
        Self::with_headroom(format, 1024)
    }

    /// Create a sink that may run `frames` ahead of the wall clock
    pub fn with_headroom(format: AudioFormat, frames: usize) -> Self {
        Self {
            format,
            headroom_frames: frames as u64,
            clock_start: None,
            last_write: None,
            clock_frames: 0,
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of every frame accepted
    ///
    /// Clone it before handing the sink to a player.
    pub fn frames_written(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.written)
    }
}

impl AudioSink for NullSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write(&mut self, block: &AudioBuffer) -> Result<usize> {
        let now = Instant::now();
        let idle = self
            .last_write
            .map_or(true, |last| now.duration_since(last) > IDLE_RESET);
        if idle {
            self.clock_start = Some(now);
            self.clock_frames = 0;
        }
        self.last_write = Some(now);

        let elapsed = self
            .clock_start
            .map_or(Duration::ZERO, |start| now.duration_since(start));
        let due = (elapsed.as_secs_f64() * f64::from(self.format.sample_rate.as_hz())) as u64;
        let allowance = (due + self.headroom_frames).saturating_sub(self.clock_frames);
        let accepted = (block.frames() as u64).min(allowance);

        self.clock_frames += accepted;
        self.written.fetch_add(accepted, Ordering::Relaxed);
        Ok(accepted as usize)
    }

    fn flush(&mut self) {
        self.last_write = None;
    }
}
