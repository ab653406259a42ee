//! Key/value tag sets attached to a source
//!
//! Tags keep the order in which they were read from the file. Keys match
//! case-insensitively unless `TagFlags::MATCH_CASE` is given.

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// A single metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Entry key, e.g. `TITLE` or `REPLAYGAIN_TRACK_GAIN`
    pub key: String,
    /// Entry value
    pub value: String,
}

impl Tag {
    /// Create a new tag entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Flags controlling tag lookup and updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFlags(u8);

impl TagFlags {
    /// No flags: case-insensitive match, overwrite existing entries
    pub const NONE: Self = Self(0);
    /// Compare keys case-sensitively
    pub const MATCH_CASE: Self = Self(1);
    /// Leave an existing entry untouched
    pub const DONT_OVERWRITE: Self = Self(1 << 4);
    /// Concatenate onto an existing entry; no delimiter is inserted
    pub const APPEND: Self = Self(1 << 5);

    /// Whether every flag in `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TagFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TagFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Ordered list of tag entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    entries: Vec<Tag>,
}

impl TagSet {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    fn key_matches(candidate: &str, key: &str, flags: TagFlags) -> bool {
        if flags.contains(TagFlags::MATCH_CASE) {
            candidate == key
        } else {
            candidate.eq_ignore_ascii_case(key)
        }
    }

    /// Find the first entry matching `key` strictly after index `after`
    ///
    /// Pass `None` to search from the start. The returned index can be fed
    /// back as `after` to walk through duplicate keys.
    pub fn get(&self, key: &str, after: Option<usize>, flags: TagFlags) -> Option<(usize, &Tag)> {
        let start = after.map_or(0, |i| i + 1);
        self.entries
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, tag)| Self::key_matches(&tag.key, key, flags))
    }

    /// Value of the first entry matching `key`
    pub fn value(&self, key: &str, flags: TagFlags) -> Option<&str> {
        self.get(key, None, flags).map(|(_, tag)| tag.value.as_str())
    }

    /// Set, append to or delete entries for `key`
    ///
    /// `None` deletes every matching entry. Returns whether the set changed.
    pub fn set(&mut self, key: &str, value: Option<&str>, flags: TagFlags) -> bool {
        let Some(value) = value else {
            let before = self.entries.len();
            self.entries
                .retain(|tag| !Self::key_matches(&tag.key, key, flags));
            return self.entries.len() != before;
        };

        let Some(index) = self
            .entries
            .iter()
            .position(|tag| Self::key_matches(&tag.key, key, flags))
        else {
            self.entries.push(Tag::new(key, value));
            return true;
        };

        if flags.contains(TagFlags::DONT_OVERWRITE) {
            return false;
        }

        if flags.contains(TagFlags::APPEND) {
            if value.is_empty() {
                return false;
            }
            self.entries[index].value.push_str(value);
            return true;
        }

        let mut changed = self.entries[index].value != value;
        self.entries[index].value = value.to_string();

        // Later duplicates are dropped so the key has a single value
        let mut position = 0;
        let before = self.entries.len();
        self.entries.retain(|tag| {
            let keep = position <= index || !Self::key_matches(&tag.key, key, flags);
            position += 1;
            keep
        });
        changed |= self.entries.len() != before;
        changed
    }

    /// All entries in order
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.entries.iter()
    }

    /// Entries as a slice
    pub fn as_slice(&self) -> &[Tag] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Tag>> for TagSet {
    fn from(entries: Vec<Tag>) -> Self {
        Self { entries }
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
