//! Source handles
//!
//! An `AudioFile` couples a source path with the decoder that understands it
//! and the tag set read from it. Handles are shared as `Arc<AudioFile>`:
//! playlists and scans hold clones, so a source stays alive for as long as
//! anything still references it and "closing" only drops the caller's clone.

use crate::error::{CadenceError, Result};
use crate::traits::{AudioDecoder, DecodeStream, TagStore};
use crate::types::{AudioFormat, Tag, TagFlags, TagSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Shared reference to an open source
pub type SourceHandle = Arc<AudioFile>;

/// An open, decodable audio source plus its editable tag set
pub struct AudioFile {
    path: PathBuf,
    format: AudioFormat,
    format_names: Vec<String>,
    decoder: Arc<dyn AudioDecoder>,
    tag_store: Arc<dyn TagStore>,
    tags: Mutex<TagSet>,
    dirty: AtomicBool,
    duration: OnceLock<f64>,
}

impl AudioFile {
    /// Open a source
    ///
    /// The decoder is asked to open the source once so unreadable files fail
    /// here rather than during playback. Tags that cannot be read are logged
    /// and the handle starts with an empty tag set.
    ///
    /// # Errors
    /// Returns `Io` or `Decode` if the decoder rejects the source
    pub fn open(
        path: impl AsRef<Path>,
        decoder: Arc<dyn AudioDecoder>,
        tag_store: Arc<dyn TagStore>,
    ) -> Result<SourceHandle> {
        let path = path.as_ref().to_path_buf();
        let stream = decoder.open(&path)?;
        let format = stream.format();
        let format_names = stream.format_names();

        let duration = OnceLock::new();
        if let Some(secs) = stream.duration() {
            let _ = duration.set(secs);
        }

        let tags = match tag_store.read_tags(&path) {
            Ok(tags) => TagSet::from(tags),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read tags");
                TagSet::new()
            }
        };

        debug!(
            path = %path.display(),
            sample_rate = format.sample_rate.as_hz(),
            channels = format.channels,
            format = %format_names.join(","),
            tags = tags.len(),
            "Opened source"
        );

        Ok(Arc::new(Self {
            path,
            format,
            format_names,
            decoder,
            tag_store,
            tags: Mutex::new(tags),
            dirty: AtomicBool::new(false),
            duration,
        }))
    }

    fn lock_tags(&self) -> MutexGuard<'_, TagSet> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Origin path of the source
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Native PCM format reported by the decoder at open time
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Short names of the container and codec, container first
    pub fn format_names(&self) -> &[String] {
        &self.format_names
    }

    /// Comma-separated format short names, e.g. `ogg,vorbis`
    ///
    /// Empty if the decoder could not name the format.
    pub fn short_names(&self) -> String {
        self.format_names.join(",")
    }

    /// Whether the tag set has edits not yet saved
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Duration in seconds, probed once and cached
    pub fn duration(&self) -> Result<f64> {
        if let Some(secs) = self.duration.get() {
            return Ok(*secs);
        }
        let secs = self.decoder.probe_duration(&self.path)?;
        let _ = self.duration.set(secs);
        Ok(secs)
    }

    /// Open a fresh decode cursor positioned at the start of the source
    pub fn open_stream(&self) -> Result<Box<dyn DecodeStream>> {
        self.decoder.open(&self.path)
    }

    /// Snapshot of every tag entry
    pub fn tags(&self) -> Vec<Tag> {
        self.lock_tags().as_slice().to_vec()
    }

    /// Value of the first entry matching `key`
    pub fn tag(&self, key: &str, flags: TagFlags) -> Option<String> {
        self.lock_tags().value(key, flags).map(str::to_string)
    }

    /// Set, append to or delete (`None`) a tag entry
    ///
    /// Nothing is written to disk until `save`.
    pub fn set_tag(&self, key: &str, value: Option<&str>, flags: TagFlags) -> Result<()> {
        if key.is_empty() {
            return Err(CadenceError::invalid_reference("empty tag key"));
        }
        if self.lock_tags().set(key, value, flags) {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Write pending tag edits through the tag capability
    ///
    /// # Errors
    /// Returns `Io` if the tag store fails; the dirty flag stays set
    pub fn save(&self) -> Result<()> {
        let tags = self.lock_tags();
        self.tag_store.write_tags(&self.path, tags.as_slice())?;
        self.dirty.store(false, Ordering::Release);
        debug!(path = %self.path.display(), entries = tags.len(), "Saved tags");
        Ok(())
    }

    /// Release the caller's reference
    ///
    /// Playlist items and scan entries that still hold the handle keep the
    /// source alive.
    pub fn close(self: Arc<Self>) {
        if self.is_dirty() {
            warn!(path = %self.path.display(), "Closing source with unsaved tag edits");
        }
    }
}

impl fmt::Debug for AudioFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFile")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("format_names", &self.format_names)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryTagStore, SyntheticDecoder};

    fn open_file(tags: Vec<Tag>) -> (SourceHandle, Arc<MemoryTagStore>) {
        let decoder = Arc::new(SyntheticDecoder::new());
        decoder.add_constant("/music/a.wav", 0.5, 1.5);
        let store = Arc::new(MemoryTagStore::new());
        store.insert("/music/a.wav", tags);
        let file = AudioFile::open("/music/a.wav", decoder, store.clone()).unwrap();
        (file, store)
    }

    #[test]
    fn edits_mark_dirty_until_saved() {
        let (file, store) = open_file(vec![Tag::new("TITLE", "Old")]);
        assert!(!file.is_dirty());

        file.set_tag("title", Some("New"), TagFlags::NONE).unwrap();
        assert!(file.is_dirty());
        assert_eq!(file.tag("TITLE", TagFlags::NONE).as_deref(), Some("New"));

        file.save().unwrap();
        assert!(!file.is_dirty());
        assert_eq!(store.get("/music/a.wav"), vec![Tag::new("TITLE", "New")]);
    }

    #[test]
    fn no_op_edit_keeps_clean() {
        let (file, _) = open_file(vec![Tag::new("TITLE", "Same")]);
        file.set_tag("TITLE", Some("Same"), TagFlags::NONE).unwrap();
        assert!(!file.is_dirty());
    }

    #[test]
    fn failed_save_keeps_dirty() {
        let (file, store) = open_file(Vec::new());
        store.fail_writes(true);
        file.set_tag("ALBUM", Some("X"), TagFlags::NONE).unwrap();
        assert!(matches!(file.save(), Err(CadenceError::Io(_))));
        assert!(file.is_dirty());
    }

    #[test]
    fn reports_decoder_format_names() {
        let (file, _) = open_file(Vec::new());
        assert_eq!(file.format_names(), ["pcm_f32le".to_string()]);
        assert_eq!(file.short_names(), "pcm_f32le");
    }

    #[test]
    fn duration_is_cached() {
        let (file, _) = open_file(Vec::new());
        assert!((file.duration().unwrap() - 1.5).abs() < 1e-3);
    }

    #[test]
    fn unknown_source_fails_to_open() {
        let decoder = Arc::new(SyntheticDecoder::new());
        let store = Arc::new(MemoryTagStore::new());
        let err = AudioFile::open("/missing.wav", decoder, store).unwrap_err();
        assert!(matches!(err, CadenceError::Io(_)));
    }
}
