//! Tag capability backed by lofty
//!
//! Keys are exposed with their Vorbis comment spelling (`TITLE`, `ARTIST`,
//! `REPLAYGAIN_TRACK_GAIN`, ...) whatever the underlying tag format, so the
//! same key works for ID3v2, APE, MP4 and Vorbis comments alike.

use crate::error::{AudioError, Result};
use cadence_core::{Tag, TagStore};
use lofty::{ItemKey, ItemValue, Probe, TagExt, TagItem, TagType, TaggedFileExt};
use std::path::Path;
use tracing::debug;

/// Key spelling used for every tag format
const GENERIC_TAG_TYPE: TagType = TagType::VorbisComments;

/// Reads and writes textual tag items through lofty
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagStore;

impl LoftyTagStore {
    /// Create a new tag store
    pub fn new() -> Self {
        Self
    }

    fn generic_key(key: &ItemKey, tag_type: TagType) -> Option<String> {
        key.map_key(GENERIC_TAG_TYPE, true)
            .or_else(|| key.map_key(tag_type, true))
            .map(str::to_string)
    }

    fn item_key(key: &str, tag_type: TagType) -> ItemKey {
        match ItemKey::from_key(GENERIC_TAG_TYPE, key) {
            ItemKey::Unknown(_) => ItemKey::from_key(tag_type, key),
            known => known,
        }
    }

    fn read(path: &Path) -> Result<Vec<Tag>> {
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }

        let tagged_file = Probe::open(path)?.read()?;
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(Vec::new());
        };

        let tags = tag
            .items()
            .filter_map(|item| {
                let value = item.value().text()?;
                let key = Self::generic_key(item.key(), tag.tag_type())?;
                Some(Tag::new(key, value))
            })
            .collect();
        Ok(tags)
    }

    fn write(path: &Path, tags: &[Tag]) -> Result<()> {
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }

        let mut tagged_file = Probe::open(path)?.read()?;
        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(lofty::Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| AudioError::Tag(format!("cannot create {tag_type:?} tag")))?;

        // Text items are replaced wholesale; pictures and binary items stay
        tag.retain(|item| item.value().text().is_none());
        for entry in tags {
            let key = Self::item_key(&entry.key, tag_type);
            let item = TagItem::new(key, ItemValue::Text(entry.value.clone()));
            if !tag.push(item) {
                debug!(key = %entry.key, ?tag_type, "Tag format has no slot for key");
            }
        }

        tag.save_to_path(path)?;
        debug!(path = %path.display(), entries = tags.len(), "Wrote tags");
        Ok(())
    }
}

impl TagStore for LoftyTagStore {
    fn read_tags(&self, path: &Path) -> cadence_core::Result<Vec<Tag>> {
        Ok(Self::read(path)?)
    }

    fn write_tags(&self, path: &Path, tags: &[Tag]) -> cadence_core::Result<()> {
        Ok(Self::write(path, tags)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaygain_keys_map_to_known_items() {
        assert_eq!(
            LoftyTagStore::item_key("REPLAYGAIN_TRACK_GAIN", TagType::Id3v2),
            ItemKey::ReplayGainTrackGain
        );
        assert_eq!(
            LoftyTagStore::item_key("TITLE", TagType::Ape),
            ItemKey::TrackTitle
        );
    }

    #[test]
    fn known_items_read_back_with_generic_names() {
        assert_eq!(
            LoftyTagStore::generic_key(&ItemKey::TrackArtist, TagType::Id3v2).as_deref(),
            Some("ARTIST")
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LoftyTagStore::new()
            .read_tags(Path::new("/nonexistent/file.flac"))
            .unwrap_err();
        assert!(matches!(err, cadence_core::CadenceError::Io(_)));
    }
}
