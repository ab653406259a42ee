//! Gain scan engine
//!
//! Decodes a batch of sources in full, without output, measuring each one's
//! loudness and peak. Every finished entry is reported through an optional
//! completion callback; long entries also report progress. The album result
//! combines the gating state of every completed entry.
//!
//! Abort is cooperative: a callback (or another thread) sets the flag
//! through an [`AbortHandle`]. The entry being analyzed is finished, the
//! rest are never started.
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_loudness::{GainScan, ScanConfig};
//!
//! # fn example() -> cadence_core::Result<()> {
//! let mut scan = GainScan::new(ScanConfig::default());
//! scan.on_complete(|name: &String, gain, peak| {
//!     println!("{name}: gain {gain:.3}, peak {peak:.3}");
//! });
//! for name in ["a.flac", "b.flac"] {
//!     scan.add(cadence_audio::open(name)?, name.to_string())?;
//! }
//! let summary = scan.exec()?;
//! println!("album: gain {:.3}, peak {:.3}", summary.gain, summary.peak);
//! # Ok(())
//! # }
//! ```

use crate::analyzer::LoudnessAnalyzer;
use crate::config::ScanConfig;
use crate::error::LoudnessError;
use crate::replaygain::{AlbumGain, ReplayGainCalculator, TrackGain};
use cadence_audio::{DecodePipeline, PipelineOptions};
use cadence_core::{db_to_gain, CadenceError, Result, SourceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type ProgressFn<'a, T> = Box<dyn FnMut(&T, f64) + 'a>;
type CompleteFn<'a, T> = Box<dyn FnMut(&T, f64, f64) + 'a>;

/// Shared flag requesting a running scan to stop
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Ask the scan to stop after the entry in progress
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether abort was requested
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one scan entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting to be analyzed
    Queued,
    /// Being decoded and measured
    Analyzing,
    /// Measured successfully
    Complete,
    /// Could not be opened or decoded; excluded from the album result
    Failed,
    /// Never started because the scan was aborted
    Aborted,
}

/// Outcome for one entry
#[derive(Debug, Clone)]
pub struct EntryResult<T> {
    /// The caller's value passed to [`GainScan::add`]
    pub userdata: T,
    /// Source that was scanned
    pub file: SourceHandle,
    /// Final state: `Complete`, `Failed` or `Aborted`
    pub state: EntryState,
    /// Track gain for `Complete` entries
    pub track: Option<TrackGain>,
}

impl<T> EntryResult<T> {
    /// Linear track gain, 1.0 unless complete
    pub fn gain(&self) -> f64 {
        self.track.map_or(1.0, |t| t.linear_gain())
    }

    /// Linear track peak, 0.0 unless complete
    pub fn peak(&self) -> f64 {
        self.track.map_or(0.0, |t| t.peak)
    }
}

/// Aggregate result of a scan
#[derive(Debug, Clone)]
pub struct ScanSummary<T> {
    /// Recommended linear gain for every completed entry played together
    pub gain: f64,
    /// Maximum peak over completed entries, linear
    pub peak: f64,
    /// `gain` in decibels
    pub gain_db: f64,
    /// Album measurements, `None` if nothing completed
    pub album: Option<AlbumGain>,
    /// Entries measured successfully
    pub completed: usize,
    /// Entries skipped because of abort
    pub aborted: usize,
    /// Abort was requested, even if it came too late to skip anything
    pub abort_requested: bool,
    /// Per-entry results in insertion order
    pub results: Vec<EntryResult<T>>,
}

impl<T> ScanSummary<T> {
    /// Whether abort was requested during the scan
    ///
    /// True even when the request arrived during the last entry, in which
    /// case `aborted` is zero.
    pub fn was_aborted(&self) -> bool {
        self.abort_requested || self.aborted > 0
    }

    /// Entries that failed to decode
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.state == EntryState::Failed)
            .count()
    }
}

struct ScanEntry<T> {
    file: SourceHandle,
    userdata: T,
    state: EntryState,
}

/// Batch ReplayGain scanner
///
/// `T` is the caller's value attached to every entry and handed back in
/// callbacks and results.
pub struct GainScan<'a, T> {
    config: ScanConfig,
    entries: Vec<ScanEntry<T>>,
    on_progress: Option<ProgressFn<'a, T>>,
    on_complete: Option<CompleteFn<'a, T>>,
    abort: AbortHandle,
    executed: bool,
}

impl<'a, T> GainScan<'a, T> {
    /// Create an empty scan
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            on_progress: None,
            on_complete: None,
            abort: AbortHandle::default(),
            executed: false,
        }
    }

    /// Called with the entry's userdata and a 0..=1 fraction roughly every
    /// `progress_interval_secs` of decoded audio
    pub fn on_progress(&mut self, callback: impl FnMut(&T, f64) + 'a) {
        self.on_progress = Some(Box::new(callback));
    }

    /// Called once per completed entry with its userdata, linear gain and
    /// linear peak
    pub fn on_complete(&mut self, callback: impl FnMut(&T, f64, f64) + 'a) {
        self.on_complete = Some(Box::new(callback));
    }

    /// Handle callbacks or other threads use to request abort
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue `file` for analysis
    ///
    /// # Errors
    /// Returns `InvalidState` once the scan has been executed
    pub fn add(&mut self, file: SourceHandle, userdata: T) -> Result<()> {
        if self.executed {
            return Err(CadenceError::invalid_state(
                "cannot add to a scan that has already run",
            ));
        }
        debug!(path = %file.path().display(), "Queued for gain scan");
        self.entries.push(ScanEntry {
            file,
            userdata,
            state: EntryState::Queued,
        });
        Ok(())
    }

    /// Analyze every queued entry, blocking until done or aborted
    ///
    /// # Errors
    /// - `InvalidState` if the scan already ran
    /// - `Config` if the scan configuration is invalid
    /// - `Aborted` if abort was requested before any entry completed
    pub fn exec(&mut self) -> Result<ScanSummary<T>> {
        if self.executed {
            return Err(CadenceError::invalid_state("scan has already run"));
        }
        self.config.validate()?;
        self.executed = true;

        let calculator = ReplayGainCalculator::with_reference(self.config.reference_lufs);
        let total = self.entries.len();
        let mut analyzers = Vec::new();
        let mut tracks = Vec::with_capacity(total);
        info!(entries = total, "Starting gain scan");

        for (index, entry) in self.entries.iter_mut().enumerate() {
            if self.abort.is_aborted() {
                entry.state = EntryState::Aborted;
                tracks.push(None);
                continue;
            }

            entry.state = EntryState::Analyzing;
            debug!(index, path = %entry.file.path().display(), "Analyzing");
            let measured = analyze(
                &entry.file,
                &entry.userdata,
                self.config.progress_interval_secs,
                &mut self.on_progress,
            )
            .and_then(|analyzer| Ok((analyzer.info()?, analyzer)));

            match measured {
                Ok((info, analyzer)) => {
                    let track = calculator.track_gain(&info);
                    entry.state = EntryState::Complete;
                    debug!(
                        path = %entry.file.path().display(),
                        gain_db = track.gain_db,
                        peak = track.peak,
                        "Entry complete"
                    );
                    if let Some(callback) = self.on_complete.as_mut() {
                        callback(&entry.userdata, track.linear_gain(), track.peak);
                    }
                    analyzers.push(analyzer);
                    tracks.push(Some(track));
                }
                Err(e) => {
                    warn!(path = %entry.file.path().display(), error = %e, "Skipping entry");
                    entry.state = EntryState::Failed;
                    tracks.push(None);
                }
            }
        }

        let completed = analyzers.len();
        let aborted = self
            .entries
            .iter()
            .filter(|e| e.state == EntryState::Aborted)
            .count();
        if aborted > 0 && completed == 0 {
            info!("Gain scan aborted before any entry completed");
            return Err(CadenceError::Aborted);
        }

        let album = calculator.album_gain(&analyzers)?;
        let gain_db = album.map_or(0.0, |a| a.gain_db);
        let peak = album.map_or(0.0, |a| a.peak);
        let abort_requested = self.abort.is_aborted();
        info!(completed, aborted, abort_requested, gain_db, peak, "Gain scan finished");

        let results = std::mem::take(&mut self.entries)
            .into_iter()
            .zip(tracks)
            .map(|(entry, track)| EntryResult {
                userdata: entry.userdata,
                file: entry.file,
                state: entry.state,
                track,
            })
            .collect();

        Ok(ScanSummary {
            gain: db_to_gain(gain_db),
            peak,
            gain_db,
            album,
            completed,
            aborted,
            abort_requested,
            results,
        })
    }

    /// Release the scan
    ///
    /// Consuming `self` makes it impossible to destroy a scan while `exec`
    /// runs or from inside one of its callbacks. Sources are released, not
    /// closed.
    pub fn destroy(self) {
        debug!(entries = self.entries.len(), "Gain scan destroyed");
    }
}

/// Decode `file` fully into a fresh analyzer
fn analyze<T>(
    file: &SourceHandle,
    userdata: &T,
    interval_secs: f64,
    on_progress: &mut Option<ProgressFn<'_, T>>,
) -> std::result::Result<LoudnessAnalyzer, LoudnessError> {
    let pipeline = DecodePipeline::open(file, PipelineOptions::default())?;
    let mut analyzer = LoudnessAnalyzer::new(pipeline.output_format())?;
    let duration = file.duration().ok().filter(|d| *d > 0.0);
    let mut next_report = interval_secs;

    for buffer in pipeline {
        analyzer.add_buffer(&buffer?)?;

        let decoded = analyzer.duration_secs();
        if decoded >= next_report {
            next_report = decoded + interval_secs;
            if let Some(callback) = on_progress.as_mut() {
                let fraction = duration.map_or(0.0, |d| (decoded / d).min(1.0));
                callback(userdata, fraction);
            }
        }
    }
    Ok(analyzer)
}

impl<T> std::fmt::Debug for GainScan<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GainScan")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("aborted", &self.abort.is_aborted())
            .field("executed", &self.executed)
            .finish_non_exhaustive()
    }
}
