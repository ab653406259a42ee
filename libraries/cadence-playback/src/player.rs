//! Player engine
//!
//! Two worker threads share one lock-protected state with the API:
//!
//! - the decode thread keeps up to `lookahead_secs` of PCM buffered ahead of
//!   the play head, decoding with the lock released
//! - the output thread drains the buffer into the sink one period at a time,
//!   moving the play head and reporting item changes and underruns
//!
//! Every change that invalidates buffered or in-flight audio (seek, clear,
//! removal or insertion inside the decode-ahead range) bumps a generation
//! counter; the decode thread discards any frame decoded under an older
//! generation.

use crate::config::PlayerConfig;
use crate::error::PlaybackError;
use crate::events::{EventChannel, PlayerEvent};
use crate::playlist::{ItemId, Playlist, PlaylistItem};
use cadence_audio::{DecodePipeline, PipelineOptions};
use cadence_core::{AudioBuffer, AudioFormat, AudioSink, Result, SourceHandle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Pause between retries when the sink accepts nothing
const SINK_RETRY: Duration = Duration::from_millis(2);

/// A position in the playlist
#[derive(Debug, Clone, Copy, PartialEq)]
struct Head {
    item: ItemId,
    secs: f64,
}

impl Head {
    fn start_of(item: ItemId) -> Self {
        Self { item, secs: 0.0 }
    }
}

/// Decoded, gain-scaled PCM waiting for the output thread
struct Chunk {
    item: ItemId,
    pts: f64,
    samples: Vec<f32>,
    /// Samples already handed to the sink
    consumed: usize,
}

impl Chunk {
    fn remaining_frames(&self, channels: usize) -> usize {
        (self.samples.len() - self.consumed) / channels
    }
}

struct State {
    playlist: Playlist,
    volume: f64,
    playing: bool,
    buffer: VecDeque<Chunk>,
    buffered_frames: usize,
    play_head: Option<Head>,
    decode_head: Option<Head>,
    /// Open pipeline continuing from the decode head
    pipeline: Option<(ItemId, DecodePipeline)>,
    /// Every item up to the end of the playlist has been decoded
    exhausted: bool,
    generation: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Wakes the decode thread
    decode_cv: Condvar,
    /// Wakes the output thread
    output_cv: Condvar,
    events: EventChannel,
    /// Bumped whenever audio queued in the sink belongs to a discarded position
    flush_epoch: AtomicU64,
    shutdown: AtomicBool,
    config: PlayerConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_all(&self) {
        self.decode_cv.notify_all();
        self.output_cv.notify_all();
    }

    fn format(&self) -> AudioFormat {
        self.config.output_format
    }

    /// Ask the output thread to drop what the sink still holds
    fn request_flush(&self) {
        self.flush_epoch.fetch_add(1, Ordering::AcqRel);
    }
}

impl State {
    fn current_item(&self) -> Option<ItemId> {
        self.play_head.map(|h| h.item)
    }

    /// Drop buffered and in-flight audio and restart decoding at `head`
    fn restart_at(&mut self, head: Option<Head>) {
        self.buffer.clear();
        self.buffered_frames = 0;
        self.pipeline = None;
        self.exhausted = false;
        self.generation += 1;
        self.play_head = head;
        self.decode_head = head;
    }

    /// Items after the play head item up to and including the decode head item
    fn decode_ahead_items(&self) -> Vec<ItemId> {
        let (Some(play), Some(decode)) = (self.play_head, self.decode_head) else {
            return Vec::new();
        };
        let mut items = Vec::new();
        if play.item == decode.item {
            return items;
        }
        let mut cursor = self.playlist.next(play.item).ok().flatten();
        while let Some(item) = cursor {
            items.push(item);
            if item == decode.item {
                break;
            }
            cursor = self.playlist.next(item).ok().flatten();
        }
        items
    }

    fn drop_chunks_where(&mut self, channels: usize, mut discard: impl FnMut(ItemId) -> bool) {
        let mut dropped = 0;
        self.buffer.retain(|chunk| {
            let drop_it = discard(chunk.item);
            if drop_it {
                dropped += chunk.remaining_frames(channels);
            }
            !drop_it
        });
        self.buffered_frames -= dropped;
    }

    /// Move the end-of-playlist state back to the head, paused
    fn rewind(&mut self, events: &EventChannel) {
        let previous = self.current_item();
        let head = self.playlist.head().map(Head::start_of);
        self.playing = false;
        self.restart_at(head);
        if self.current_item() != previous {
            events.push(PlayerEvent::NowPlaying);
        }
    }

    fn wants_decode(&self, lookahead_frames: usize) -> bool {
        self.playing
            && !self.exhausted
            && self.decode_head.is_some()
            && self.buffered_frames < lookahead_frames
    }
}

/// Decode-ahead audio player over a mutable playlist
///
/// All methods take `&self`; the player can be shared between threads.
/// Dropping the player stops and joins its worker threads. Source handles
/// held by the playlist are released, never closed.
pub struct Player {
    shared: Arc<Shared>,
    decode_thread: Option<JoinHandle<()>>,
    output_thread: Option<JoinHandle<()>>,
}

impl Player {
    /// Create a player writing to `sink`
    ///
    /// The sink's format overrides `config.output_format`.
    ///
    /// # Errors
    /// Returns `Config` for invalid settings and `Io` if a worker thread
    /// cannot be started
    pub fn new(sink: Box<dyn AudioSink>, mut config: PlayerConfig) -> Result<Self> {
        let sink_format = sink.format();
        if sink_format != config.output_format {
            warn!(
                configured = ?config.output_format,
                sink = ?sink_format,
                "Sink format differs from configuration, using sink format"
            );
            config.output_format = sink_format;
        }
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                playlist: Playlist::new(),
                volume: 1.0,
                playing: false,
                buffer: VecDeque::new(),
                buffered_frames: 0,
                play_head: None,
                decode_head: None,
                pipeline: None,
                exhausted: false,
                generation: 0,
                shutdown: false,
            }),
            decode_cv: Condvar::new(),
            output_cv: Condvar::new(),
            events: EventChannel::new(config.event_capacity),
            flush_epoch: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            config,
        });

        let decode_shared = Arc::clone(&shared);
        let decode_thread = thread::Builder::new()
            .name("cadence-decode".to_string())
            .spawn(move || decode_loop(&decode_shared))
            .map_err(|source| PlaybackError::ThreadSpawn {
                name: "decode",
                source,
            })?;

        let output_shared = Arc::clone(&shared);
        let output_thread = thread::Builder::new()
            .name("cadence-output".to_string())
            .spawn(move || output_loop(&output_shared, sink));
        let output_thread = match output_thread {
            Ok(handle) => handle,
            Err(source) => {
                shutdown(&shared);
                let _ = decode_thread.join();
                return Err(PlaybackError::ThreadSpawn {
                    name: "output",
                    source,
                }
                .into());
            }
        };

        info!(format = ?shared.format(), "Player started");
        Ok(Self {
            shared,
            decode_thread: Some(decode_thread),
            output_thread: Some(output_thread),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.lock()
    }

    fn channels(&self) -> usize {
        self.shared.format().channels.max(1) as usize
    }

    // ===== Playlist =====

    /// Insert `file` before `before`, or append when `before` is `None`
    ///
    /// Inserting into an empty playlist makes the new item current.
    pub fn insert(
        &self,
        file: SourceHandle,
        gain_db: f64,
        before: Option<ItemId>,
    ) -> Result<ItemId> {
        let mut state = self.lock();
        let path = file.path().display().to_string();
        let id = state.playlist.insert(file, gain_db, before)?;
        debug!(item = %id, path, gain_db, "Inserted item");

        let Some(play) = state.play_head else {
            state.restart_at(Some(Head::start_of(id)));
            self.shared.events.push(PlayerEvent::NowPlaying);
            drop(state);
            self.shared.wake_all();
            return Ok(id);
        };

        let inside_decode_ahead = match before {
            Some(before) if before != play.item => state.decode_ahead_items().contains(&before),
            _ => false,
        };

        if inside_decode_ahead {
            // Frames decoded past the current item now skip the new one
            let channels = self.channels();
            state.drop_chunks_where(channels, |item| item != play.item);
            state.pipeline = None;
            state.exhausted = false;
            state.generation += 1;
            state.decode_head = Some(Head::start_of(id));
            trace!(item = %id, "Restarting decode at inserted item");
        } else if state.exhausted {
            let decoded_last = state.decode_head.map(|h| h.item);
            if state.playlist.prev(id)? == decoded_last {
                state.exhausted = false;
                state.pipeline = None;
                state.decode_head = Some(Head::start_of(id));
                trace!(item = %id, "Resuming decode at appended item");
            }
        }
        drop(state);
        self.shared.decode_cv.notify_all();
        Ok(id)
    }

    /// Remove `item` from the playlist
    ///
    /// Removing the current item moves playback to its successor, or pauses
    /// and rewinds to the head if it was the last one.
    pub fn remove(&self, item: ItemId) -> Result<()> {
        let mut state = self.lock();
        let next = state.playlist.next(item)?;
        let ahead = state.decode_ahead_items();
        let channels = self.channels();

        if state.current_item() == Some(item) {
            state.playlist.remove(item)?;
            self.shared.request_flush();
            match next {
                Some(next) => {
                    state.restart_at(Some(Head::start_of(next)));
                    self.shared.events.push(PlayerEvent::NowPlaying);
                }
                None => state.rewind(&self.shared.events),
            }
            debug!(item = %item, "Removed current item");
        } else if ahead.contains(&item) {
            state.drop_chunks_where(channels, |chunk_item| chunk_item == item);
            if state.decode_head.map(|h| h.item) == Some(item) {
                state.pipeline = None;
                state.generation += 1;
                match next {
                    Some(next) => {
                        state.decode_head = Some(Head::start_of(next));
                        state.exhausted = false;
                    }
                    None => {
                        let end = state
                            .buffer
                            .back()
                            .map(|c| Head {
                                item: c.item,
                                secs: c.pts + self.shared.format().frames_to_secs(c.samples.len() / channels),
                            })
                            .or(state.play_head);
                        state.decode_head = end;
                        state.exhausted = true;
                    }
                }
            }
            state.playlist.remove(item)?;
            debug!(item = %item, "Removed decoded-ahead item");
        } else {
            state.playlist.remove(item)?;
            debug!(item = %item, "Removed item");
        }
        drop(state);
        self.shared.wake_all();
        Ok(())
    }

    /// Remove every item
    pub fn clear(&self) {
        let mut state = self.lock();
        let had_current = state.play_head.is_some();
        state.playlist.clear();
        state.playing = false;
        state.restart_at(None);
        self.shared.request_flush();
        if had_current {
            self.shared.events.push(PlayerEvent::NowPlaying);
        }
        drop(state);
        self.shared.wake_all();
        debug!("Cleared playlist");
    }

    /// Number of items
    pub fn count(&self) -> usize {
        self.lock().playlist.len()
    }

    /// Snapshots of every item in playlist order
    pub fn items(&self) -> Vec<PlaylistItem> {
        self.lock().playlist.iter().collect()
    }

    /// Snapshot of one item
    pub fn item(&self, item: ItemId) -> Result<PlaylistItem> {
        Ok(self.lock().playlist.get(item)?)
    }

    /// Change an item's gain; applies to frames decoded from now on
    pub fn set_gain(&self, item: ItemId, gain_db: f64) -> Result<()> {
        self.lock().playlist.set_gain(item, gain_db)?;
        Ok(())
    }

    // ===== Transport =====

    /// Start or resume playback
    ///
    /// Does nothing while the playlist is empty.
    pub fn play(&self) {
        let mut state = self.lock();
        if state.playing || state.play_head.is_none() {
            return;
        }
        state.playing = true;
        drop(state);
        self.shared.wake_all();
        debug!("Playing");
    }

    /// Pause playback, keeping buffered audio
    pub fn pause(&self) {
        let mut state = self.lock();
        if state.playing {
            state.playing = false;
            debug!("Paused");
        }
    }

    /// Whether the player is playing
    pub fn playing(&self) -> bool {
        self.lock().playing
    }

    /// Move both heads to `seconds` into `item`
    pub fn seek(&self, item: ItemId, seconds: f64) -> Result<()> {
        let mut state = self.lock();
        if !state.playlist.contains(item) {
            // Produces the precise foreign/stale error
            state.playlist.get(item)?;
        }
        let previous = state.current_item();
        state.restart_at(Some(Head {
            item,
            secs: seconds.max(0.0),
        }));
        self.shared.request_flush();
        if previous != Some(item) {
            self.shared.events.push(PlayerEvent::NowPlaying);
        }
        drop(state);
        self.shared.wake_all();
        debug!(item = %item, seconds, "Seek");
        Ok(())
    }

    /// Audible position: current item and seconds into it
    pub fn position(&self) -> (Option<ItemId>, f64) {
        let state = self.lock();
        state
            .play_head
            .map_or((None, 0.0), |h| (Some(h.item), h.secs))
    }

    /// Decode position: item and seconds decoded up to
    pub fn decode_position(&self) -> (Option<ItemId>, f64) {
        let state = self.lock();
        state
            .decode_head
            .map_or((None, 0.0), |h| (Some(h.item), h.secs))
    }

    /// Set the global linear volume; applies to frames decoded from now on
    pub fn set_volume(&self, volume: f64) {
        self.lock().volume = volume.max(0.0);
    }

    /// Global linear volume
    pub fn volume(&self) -> f64 {
        self.lock().volume
    }

    // ===== Events =====

    /// Take the oldest event without blocking
    pub fn event_poll(&self) -> Option<PlayerEvent> {
        self.shared.events.poll()
    }

    /// Block until an event is available
    pub fn event_wait(&self) -> Option<PlayerEvent> {
        self.shared.events.wait()
    }

    /// Report whether an event is ready, optionally blocking
    pub fn event_peek(&self, block: bool) -> bool {
        self.shared.events.peek(block)
    }

    /// Handle to the event queue for consumers on other threads
    pub fn events(&self) -> EventChannel {
        self.shared.events.clone()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        shutdown(&self.shared);
        for handle in [self.decode_thread.take(), self.output_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                error!("Player worker thread panicked");
            }
        }
        self.shared.events.close();
        info!("Player stopped");
    }
}

fn shutdown(shared: &Shared) {
    shared.shutdown.store(true, Ordering::Release);
    shared.lock().shutdown = true;
    shared.wake_all();
}

// ===== Decode thread =====

enum Decoded {
    Frame(AudioBuffer),
    End,
    Failed(cadence_core::CadenceError),
}

fn decode_loop(shared: &Shared) {
    let lookahead_frames = shared.config.lookahead_frames();
    let format = shared.format();
    let mut state = shared.lock();

    loop {
        if state.shutdown {
            break;
        }
        if !state.wants_decode(lookahead_frames) {
            state = shared
                .decode_cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        }
        let Some(head) = state.decode_head else {
            continue;
        };
        let generation = state.generation;

        let pipeline = match state.pipeline.take() {
            Some((item, pipeline)) if item == head.item => Some(pipeline),
            _ => None,
        };
        let file = match state.playlist.get(head.item) {
            Ok(item) => item.file,
            Err(e) => {
                warn!(item = %head.item, error = %e, "Decode head lost its item");
                state.exhausted = true;
                continue;
            }
        };
        drop(state);

        let (pipeline, decoded) = decode_one(&file, head, pipeline, format);

        state = shared.lock();
        if state.shutdown {
            break;
        }
        if state.generation != generation {
            trace!("Discarding frame from superseded position");
            continue;
        }

        match decoded {
            Decoded::Frame(mut buffer) => {
                let gain = state.volume * state.playlist.gain(head.item).unwrap_or(1.0);
                buffer.apply_gain(gain as f32);
                let frames = buffer.frames();
                state.decode_head = Some(Head {
                    item: head.item,
                    secs: buffer.end_pts(),
                });
                state.buffer.push_back(Chunk {
                    item: head.item,
                    pts: buffer.pts,
                    samples: buffer.samples,
                    consumed: 0,
                });
                state.buffered_frames += frames;
                state.pipeline = pipeline.map(|p| (head.item, p));
                shared.output_cv.notify_all();
            }
            Decoded::End => {
                trace!(item = %head.item, "End of source");
                advance_decode(&mut state, head.item);
            }
            Decoded::Failed(e) => {
                warn!(item = %head.item, path = %file.path().display(), error = %e, "Skipping undecodable item");
                advance_decode(&mut state, head.item);
            }
        }
    }
    debug!("Decode thread exiting");
}

/// Pull one frame, opening a pipeline at the head offset when needed
fn decode_one(
    file: &SourceHandle,
    head: Head,
    pipeline: Option<DecodePipeline>,
    format: AudioFormat,
) -> (Option<DecodePipeline>, Decoded) {
    let mut pipeline = match pipeline {
        Some(pipeline) => pipeline,
        None => {
            let options = PipelineOptions::at(head.secs).with_target(format);
            match DecodePipeline::open(file, options) {
                Ok(pipeline) => pipeline,
                Err(e) => return (None, Decoded::Failed(e)),
            }
        }
    };
    match pipeline.next() {
        Some(Ok(buffer)) => (Some(pipeline), Decoded::Frame(buffer)),
        Some(Err(e)) => (None, Decoded::Failed(e)),
        None => (None, Decoded::End),
    }
}

fn advance_decode(state: &mut State, item: ItemId) {
    state.pipeline = None;
    match state.playlist.next(item).ok().flatten() {
        Some(next) => state.decode_head = Some(Head::start_of(next)),
        None => {
            state.exhausted = true;
            trace!("Decode reached end of playlist");
        }
    }
}

// ===== Output thread =====

fn output_loop(shared: &Shared, mut sink: Box<dyn AudioSink>) {
    let format = shared.format();
    let channels = format.channels.max(1) as usize;
    let period = shared.config.period_frames;
    let period_duration = Duration::from_secs_f64(format.frames_to_secs(period));
    let mut flushed_epoch = 0;
    let mut state = shared.lock();

    loop {
        if state.shutdown {
            break;
        }
        // Flush before taking a block so audio at the new position survives
        let epoch = shared.flush_epoch.load(Ordering::Acquire);
        if epoch != flushed_epoch {
            flushed_epoch = epoch;
            drop(state);
            sink.flush();
            trace!("Flushed sink");
            state = shared.lock();
            continue;
        }
        if !state.playing {
            state = shared
                .output_cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        }

        if state.buffered_frames == 0 && !state.exhausted {
            // Give the decoder one period to deliver before reporting underrun
            let generation = state.generation;
            state = shared
                .output_cv
                .wait_timeout(state, period_duration)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            if state.shutdown || !state.playing || state.generation != generation {
                continue;
            }
        }

        let block = if state.buffered_frames > 0 {
            let block = take_block(&mut state, &shared.events, period, format, channels);
            shared.decode_cv.notify_all();
            block
        } else if !state.exhausted {
            shared.events.push(PlayerEvent::BufferUnderrun);
            trace!("Buffer underrun");
            AudioBuffer::silence(period, format, 0.0)
        } else {
            info!("End of playlist");
            state.rewind(&shared.events);
            shared.decode_cv.notify_all();
            continue;
        };
        drop(state);

        write_block(shared, sink.as_mut(), block, channels, flushed_epoch);

        state = shared.lock();
    }
    sink.flush();
    debug!("Output thread exiting");
}

/// Move up to `period` frames from the buffer, advancing the play head
fn take_block(
    state: &mut State,
    events: &EventChannel,
    period: usize,
    format: AudioFormat,
    channels: usize,
) -> AudioBuffer {
    let mut samples = Vec::with_capacity(period * channels);
    let mut remaining = period;
    let block_pts = state.play_head.map_or(0.0, |h| h.secs);

    while remaining > 0 {
        let Some(chunk) = state.buffer.front_mut() else {
            break;
        };
        let take = chunk.remaining_frames(channels).min(remaining);
        let start = chunk.consumed;
        samples.extend_from_slice(&chunk.samples[start..start + take * channels]);
        chunk.consumed += take * channels;
        remaining -= take;

        let item = chunk.item;
        let secs = chunk.pts + format.frames_to_secs(chunk.consumed / channels);
        let done = chunk.consumed >= chunk.samples.len();
        if done {
            state.buffer.pop_front();
        }
        state.buffered_frames -= take;

        if state.current_item() != Some(item) {
            events.push(PlayerEvent::NowPlaying);
        }
        state.play_head = Some(Head { item, secs });
    }

    AudioBuffer::new(samples, format, block_pts)
}

/// Hand a block to the sink, retrying partial writes until it is consumed
///
/// Gives up on the rest of the block once a flush newer than `epoch` is
/// requested; the output loop flushes before taking the next block.
fn write_block(
    shared: &Shared,
    sink: &mut dyn AudioSink,
    mut block: AudioBuffer,
    channels: usize,
    epoch: u64,
) {
    while !block.is_empty() {
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        if shared.flush_epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        match sink.write(&block) {
            Ok(0) => thread::sleep(SINK_RETRY),
            Ok(accepted) => {
                let accepted = accepted.min(block.frames());
                block.samples.drain(..accepted * channels);
                block.pts += block.format.frames_to_secs(accepted);
            }
            Err(e) => {
                error!(error = %e, "Sink write failed, dropping block");
                return;
            }
        }
    }
}
