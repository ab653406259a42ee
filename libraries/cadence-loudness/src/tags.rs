//! ReplayGain tag reading and writing
//!
//! Values go through the source handle's tag set, so they land in whatever
//! tag format the file's tag store writes. Keys follow the Vorbis comment
//! convention (`REPLAYGAIN_TRACK_GAIN` = "-5.23 dB", peaks as plain linear
//! numbers).

use crate::replaygain::{AlbumGain, TrackGain};
use cadence_core::{AudioFile, Result, TagFlags};
use tracing::debug;

/// Track gain tag key
pub const TRACK_GAIN_KEY: &str = "REPLAYGAIN_TRACK_GAIN";
/// Track peak tag key
pub const TRACK_PEAK_KEY: &str = "REPLAYGAIN_TRACK_PEAK";
/// Album gain tag key
pub const ALBUM_GAIN_KEY: &str = "REPLAYGAIN_ALBUM_GAIN";
/// Album peak tag key
pub const ALBUM_PEAK_KEY: &str = "REPLAYGAIN_ALBUM_PEAK";
/// Reference loudness tag key
pub const REFERENCE_LOUDNESS_KEY: &str = "REPLAYGAIN_REFERENCE_LOUDNESS";

/// ReplayGain tag values read from a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayGainTags {
    /// Track gain in dB
    pub track_gain: Option<f64>,
    /// Track peak (linear)
    pub track_peak: Option<f64>,
    /// Album gain in dB
    pub album_gain: Option<f64>,
    /// Album peak (linear)
    pub album_peak: Option<f64>,
    /// Reference loudness in LUFS
    pub reference_loudness: Option<f64>,
}

impl ReplayGainTags {
    /// Check if track-level tags are present
    pub fn has_track_tags(&self) -> bool {
        self.track_gain.is_some()
    }

    /// Check if album-level tags are present
    pub fn has_album_tags(&self) -> bool {
        self.album_gain.is_some()
    }

    /// Gain to play the file at: album gain if `prefer_album` and present,
    /// then track gain, then 0 dB
    pub fn playback_gain_db(&self, prefer_album: bool) -> f64 {
        let album = if prefer_album { self.album_gain } else { None };
        album.or(self.track_gain).unwrap_or(0.0)
    }
}

/// Parse a gain value ("-5.23 dB" -> -5.23)
fn parse_gain(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_suffix("LUFS").unwrap_or(s);
    let s = s.strip_suffix("dB").unwrap_or(s);
    s.trim().parse().ok()
}

fn parse_peak(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

/// Read ReplayGain values from a source's tag set
///
/// Missing or malformed values are `None`.
pub fn read_replaygain_tags(file: &AudioFile) -> ReplayGainTags {
    let read = |key: &str, parse: fn(&str) -> Option<f64>| {
        file.tag(key, TagFlags::NONE).and_then(|value| parse(&value))
    };
    ReplayGainTags {
        track_gain: read(TRACK_GAIN_KEY, parse_gain),
        track_peak: read(TRACK_PEAK_KEY, parse_peak),
        album_gain: read(ALBUM_GAIN_KEY, parse_gain),
        album_peak: read(ALBUM_PEAK_KEY, parse_peak),
        reference_loudness: read(REFERENCE_LOUDNESS_KEY, parse_gain),
    }
}

/// Set ReplayGain tags on a source and save it
///
/// Existing non-ReplayGain tags are preserved. Without `album`, stale album
/// values are left untouched.
///
/// # Errors
/// Returns `Io` if the tag store cannot save; the source stays dirty
pub fn write_replaygain_tags(
    file: &AudioFile,
    track: Option<&TrackGain>,
    album: Option<&AlbumGain>,
) -> Result<()> {
    if let Some(track) = track {
        file.set_tag(
            TRACK_GAIN_KEY,
            Some(&format!("{:.2} dB", track.gain_db)),
            TagFlags::NONE,
        )?;
        file.set_tag(
            TRACK_PEAK_KEY,
            Some(&format!("{:.6}", track.peak)),
            TagFlags::NONE,
        )?;
        file.set_tag(
            REFERENCE_LOUDNESS_KEY,
            Some(&format!("{:.2} LUFS", track.reference_lufs)),
            TagFlags::NONE,
        )?;
    }

    if let Some(album) = album {
        file.set_tag(
            ALBUM_GAIN_KEY,
            Some(&format!("{:.2} dB", album.gain_db)),
            TagFlags::NONE,
        )?;
        file.set_tag(
            ALBUM_PEAK_KEY,
            Some(&format!("{:.6}", album.peak)),
            TagFlags::NONE,
        )?;
    }

    if file.is_dirty() {
        file.save()?;
        debug!(path = %file.path().display(), "Wrote ReplayGain tags");
    }
    Ok(())
}

/// Remove every ReplayGain tag from a source and save it
pub fn remove_replaygain_tags(file: &AudioFile) -> Result<()> {
    for key in [
        TRACK_GAIN_KEY,
        TRACK_PEAK_KEY,
        ALBUM_GAIN_KEY,
        ALBUM_PEAK_KEY,
        REFERENCE_LOUDNESS_KEY,
    ] {
        file.set_tag(key, None, TagFlags::NONE)?;
    }
    if file.is_dirty() {
        file.save()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::testing::{MemoryTagStore, SyntheticDecoder};
    use cadence_core::{SourceHandle, Tag};
    use std::sync::Arc;

    fn file_with(tags: Vec<Tag>) -> (SourceHandle, Arc<MemoryTagStore>) {
        let decoder = Arc::new(SyntheticDecoder::new());
        decoder.add_constant("song", 0.5, 1.0);
        let store = Arc::new(MemoryTagStore::new());
        store.insert("song", tags);
        let file = AudioFile::open("song", decoder, store.clone()).unwrap();
        (file, store)
    }

    #[test]
    fn parse_values() {
        assert_eq!(parse_gain("-5.23 dB"), Some(-5.23));
        assert_eq!(parse_gain("+3.5dB"), Some(3.5));
        assert_eq!(parse_gain(" 2.0 "), Some(2.0));
        assert_eq!(parse_gain("-18.00 LUFS"), Some(-18.0));
        assert_eq!(parse_gain("loud"), None);
        assert_eq!(parse_peak("0.988"), Some(0.988));
    }

    #[test]
    fn write_then_read_round_trip() {
        let (file, store) = file_with(vec![Tag::new("TITLE", "Song")]);
        let track = TrackGain {
            gain_db: -4.5,
            peak: 0.75,
            integrated_lufs: Some(-13.5),
            reference_lufs: -18.0,
        };

        write_replaygain_tags(&file, Some(&track), None).unwrap();

        assert!(!file.is_dirty());
        let tags = read_replaygain_tags(&file);
        assert_eq!(tags.track_gain, Some(-4.5));
        assert_eq!(tags.track_peak, Some(0.75));
        assert_eq!(tags.reference_loudness, Some(-18.0));
        assert!(!tags.has_album_tags());
        assert!((tags.playback_gain_db(true) + 4.5).abs() < 1e-9);

        let saved = store.get("song");
        assert!(saved.iter().any(|t| t.key == "TITLE" && t.value == "Song"));
        assert!(saved.iter().any(|t| t.key == TRACK_GAIN_KEY && t.value == "-4.50 dB"));
    }

    #[test]
    fn reads_lowercase_keys() {
        let (file, _) = file_with(vec![
            Tag::new("replaygain_album_gain", "-7.10 dB"),
            Tag::new("replaygain_track_gain", "-6.00 dB"),
        ]);
        let tags = read_replaygain_tags(&file);
        assert_eq!(tags.album_gain, Some(-7.1));
        assert!((tags.playback_gain_db(true) + 7.1).abs() < 1e-9);
        assert!((tags.playback_gain_db(false) + 6.0).abs() < 1e-9);
    }

    #[test]
    fn failed_save_keeps_source_dirty() {
        let (file, store) = file_with(Vec::new());
        store.fail_writes(true);
        let track = TrackGain {
            gain_db: 1.0,
            peak: 0.5,
            integrated_lufs: Some(-19.0),
            reference_lufs: -18.0,
        };
        assert!(write_replaygain_tags(&file, Some(&track), None).is_err());
        assert!(file.is_dirty());
    }

    #[test]
    fn remove_clears_values() {
        let (file, _) = file_with(vec![
            Tag::new(TRACK_GAIN_KEY, "-1.00 dB"),
            Tag::new("ARTIST", "Someone"),
        ]);
        remove_replaygain_tags(&file).unwrap();
        assert_eq!(read_replaygain_tags(&file), ReplayGainTags::default());
        assert_eq!(file.tags().len(), 1);
    }
}
