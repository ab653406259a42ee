/// CPAL-based output sink
///
/// **Architecture**: a dedicated audio thread owns the CPAL `Stream`, which
/// is not `Send` on every platform. The stream callback drains a bounded,
/// lock-protected sample queue that `write` fills; a full queue is the
/// backpressure signal the player waits on. Missing samples are played as
/// silence.
use crate::error::{OutputError, Result};
use cadence_audio::remap_channels;
use cadence_core::{AudioBuffer, AudioFormat, AudioSink, SampleRate};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace};

/// Set while a sink holds the output device
static DEVICE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Exclusive hold on the output device, released on drop
#[derive(Debug)]
struct DeviceClaim;

impl DeviceClaim {
    fn acquire() -> Result<Self> {
        DEVICE_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| OutputError::DeviceBusy)
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        DEVICE_CLAIMED.store(false, Ordering::Release);
    }
}

/// Samples waiting for the stream callback
#[derive(Debug, Default)]
struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
    /// Callback samples that had to be filled with silence
    starved: AtomicU64,
}

impl SampleQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stream callback: copy queued samples out, pad with silence
    fn fill(&self, output: &mut [f32]) {
        let mut samples = self.lock();
        let available = samples.len().min(output.len());
        for (out, sample) in output.iter_mut().zip(samples.drain(..available)) {
            *out = sample;
        }
        drop(samples);

        let missing = output.len() - available;
        if missing > 0 {
            output[available..].fill(0.0);
            self.starved.fetch_add(missing as u64, Ordering::Relaxed);
        }
    }
}

/// Output sink on the default CPAL device
///
/// Only one `CpalSink` can exist per process; opening a second one fails
/// until the first is dropped.
pub struct CpalSink {
    format: AudioFormat,
    capacity_frames: usize,
    queue: Arc<SampleQueue>,
    shutdown_tx: Sender<()>,
    audio_thread: Option<JoinHandle<()>>,
    _claim: DeviceClaim,
}

impl CpalSink {
    /// Frames queued ahead of the device by default (~93 ms at 44.1 kHz)
    pub const DEFAULT_BUFFER_FRAMES: usize = 4096;

    /// Open the default output device
    ///
    /// # Errors
    /// Returns `DeviceBusy` if another sink is open, or a device/stream
    /// error if the device cannot be started
    pub fn open() -> Result<Self> {
        Self::with_buffer_frames(Self::DEFAULT_BUFFER_FRAMES)
    }

    /// Open the default output device queueing up to `frames` frames
    pub fn with_buffer_frames(frames: usize) -> Result<Self> {
        let claim = DeviceClaim::acquire()?;
        let queue = Arc::new(SampleQueue::default());
        let (ready_tx, ready_rx) = bounded::<Result<AudioFormat>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread_queue = Arc::clone(&queue);
        let audio_thread = thread::Builder::new()
            .name("cadence-cpal".to_string())
            .spawn(move || match build_stream(&thread_queue) {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    // Park until the sink is dropped; the stream lives here
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Audio stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| OutputError::Thread(e.to_string()))?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = audio_thread.join();
                return Err(OutputError::Thread(
                    "audio thread exited during start-up".to_string(),
                ));
            }
        };

        Ok(Self {
            format,
            capacity_frames: frames.max(1),
            queue,
            shutdown_tx,
            audio_thread: Some(audio_thread),
            _claim: claim,
        })
    }

    /// Device samples played as silence because nothing was queued
    pub fn starved_samples(&self) -> u64 {
        self.queue.starved.load(Ordering::Relaxed)
    }
}

fn build_stream(queue: &Arc<SampleQueue>) -> Result<(Stream, AudioFormat)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(OutputError::DeviceNotFound)?;

    let supported = device.default_output_config()?;
    let sample_rate = supported.sample_rate();
    let config: StreamConfig = supported.config();
    let format = AudioFormat::new(SampleRate::new(sample_rate), config.channels);

    let callback_queue = Arc::clone(queue);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback_queue.fill(data),
        |err| error!(error = %err, "Audio stream error"),
        None,
    )?;
    stream.play()?;

    info!(
        sample_rate = format.sample_rate.as_hz(),
        channels = format.channels,
        "Opened output device"
    );
    Ok((stream, format))
}

impl AudioSink for CpalSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write(&mut self, block: &AudioBuffer) -> cadence_core::Result<usize> {
        if block.format.sample_rate != self.format.sample_rate {
            return Err(OutputError::UnsupportedFormat(format!(
                "{} Hz block on a {} Hz device",
                block.format.sample_rate.as_hz(),
                self.format.sample_rate.as_hz()
            ))
            .into());
        }

        let in_channels = usize::from(block.format.channels.max(1));
        let out_channels = usize::from(self.format.channels.max(1));
        let mut samples = self.queue.lock();
        let room = (self.capacity_frames * out_channels).saturating_sub(samples.len()) / out_channels;
        let frames = block.frames().min(room);
        if frames == 0 {
            return Ok(0);
        }

        let accepted = &block.samples[..frames * in_channels];
        if in_channels == out_channels {
            samples.extend(accepted.iter().copied());
        } else {
            samples.extend(remap_channels(accepted, in_channels, out_channels));
        }
        trace!(frames, queued = samples.len() / out_channels, "Queued block");
        Ok(frames)
    }

    fn flush(&mut self) {
        self.queue.lock().clear();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.audio_thread.take() {
            if handle.join().is_err() {
                error!("Audio thread panicked");
            }
        }
        debug!("Output device released");
    }
}

impl std::fmt::Debug for CpalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSink")
            .field("format", &self.format)
            .field("capacity_frames", &self.capacity_frames)
            .finish_non_exhaustive()
    }
}
