//! Ordered playlist stored as an arena of doubly-linked nodes
//!
//! Items live in a slot vector and link to each other by slot index, so
//! insertion before a known item and removal are O(1) without cyclic
//! ownership. Handles carry the owning playlist's id and the slot generation:
//! a handle from another playlist, or to a slot that has since been reused,
//! is rejected instead of silently addressing the wrong item.

use crate::error::{PlaybackError, Result};
use cadence_core::{db_to_gain, SourceHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PLAYLIST_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an item of a specific playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    playlist: u64,
    index: u32,
    generation: u32,
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.playlist, self.index, self.generation)
    }
}

/// Snapshot of one playlist item
#[derive(Debug, Clone)]
pub struct PlaylistItem {
    /// Item handle
    pub id: ItemId,
    /// Source the item plays
    pub file: SourceHandle,
    /// Linear gain multiplier (1.0 = unity)
    pub gain: f64,
}

#[derive(Debug)]
struct Node {
    file: SourceHandle,
    gain: f64,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Ordered, mutable sequence of playlist items
#[derive(Debug)]
pub struct Playlist {
    id: u64,
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

impl Playlist {
    /// Create an empty playlist
    pub fn new() -> Self {
        Self {
            id: NEXT_PLAYLIST_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn handle(&self, index: u32) -> ItemId {
        ItemId {
            playlist: self.id,
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn resolve(&self, id: ItemId) -> Result<u32> {
        if id.playlist != self.id {
            return Err(PlaybackError::ForeignItem(id));
        }
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.node.is_some() => Ok(id.index),
            _ => Err(PlaybackError::StaleItem(id)),
        }
    }

    fn node(&self, index: u32) -> &Node {
        self.slots[index as usize]
            .node
            .as_ref()
            .unwrap_or_else(|| unreachable!("linked slot {index} is vacant"))
    }

    fn node_mut(&mut self, index: u32) -> &mut Node {
        self.slots[index as usize]
            .node
            .as_mut()
            .unwrap_or_else(|| unreachable!("linked slot {index} is vacant"))
    }

    /// Insert `file` before `before`, or append when `before` is `None`
    ///
    /// # Errors
    /// Returns `ForeignItem`/`StaleItem` if `before` is not a member
    pub fn insert(
        &mut self,
        file: SourceHandle,
        gain_db: f64,
        before: Option<ItemId>,
    ) -> Result<ItemId> {
        let next = before.map(|id| self.resolve(id)).transpose()?;
        let prev = match next {
            Some(next) => self.node(next).prev,
            None => self.tail,
        };

        let node = Node {
            file,
            gain: db_to_gain(gain_db),
            prev,
            next,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(next) => self.node_mut(next).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.len += 1;
        Ok(self.handle(index))
    }

    /// Splice `id` out of the playlist
    ///
    /// The source handle is returned with the snapshot, never closed.
    pub fn remove(&mut self, id: ItemId) -> Result<PlaylistItem> {
        let index = self.resolve(id)?;
        let slot = &mut self.slots[index as usize];
        let node = slot
            .node
            .take()
            .unwrap_or_else(|| unreachable!("resolved slot {index} is vacant"));
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        self.len -= 1;

        Ok(PlaylistItem {
            id,
            file: node.file,
            gain: node.gain,
        })
    }

    /// Update an item's gain from a decibel value
    pub fn set_gain(&mut self, id: ItemId, gain_db: f64) -> Result<()> {
        let index = self.resolve(id)?;
        self.node_mut(index).gain = db_to_gain(gain_db);
        Ok(())
    }

    /// Remove every item
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the playlist has no items
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First item
    pub fn head(&self) -> Option<ItemId> {
        self.head.map(|i| self.handle(i))
    }

    /// Last item
    pub fn tail(&self) -> Option<ItemId> {
        self.tail.map(|i| self.handle(i))
    }

    /// Item after `id`
    pub fn next(&self, id: ItemId) -> Result<Option<ItemId>> {
        let index = self.resolve(id)?;
        Ok(self.node(index).next.map(|i| self.handle(i)))
    }

    /// Item before `id`
    pub fn prev(&self, id: ItemId) -> Result<Option<ItemId>> {
        let index = self.resolve(id)?;
        Ok(self.node(index).prev.map(|i| self.handle(i)))
    }

    /// Snapshot of `id`
    pub fn get(&self, id: ItemId) -> Result<PlaylistItem> {
        let index = self.resolve(id)?;
        let node = self.node(index);
        Ok(PlaylistItem {
            id,
            file: node.file.clone(),
            gain: node.gain,
        })
    }

    /// Linear gain of `id`
    pub fn gain(&self, id: ItemId) -> Result<f64> {
        let index = self.resolve(id)?;
        Ok(self.node(index).gain)
    }

    /// Whether `id` is currently a member
    pub fn contains(&self, id: ItemId) -> bool {
        self.resolve(id).is_ok()
    }

    /// Zero-based position of `id` in playlist order
    pub fn position_of(&self, id: ItemId) -> Result<usize> {
        let target = self.resolve(id)?;
        let mut cursor = self.head;
        let mut position = 0;
        while let Some(index) = cursor {
            if index == target {
                return Ok(position);
            }
            position += 1;
            cursor = self.node(index).next;
        }
        unreachable!("member {id} not reachable from head")
    }

    /// Items in playlist order
    pub fn iter(&self) -> impl Iterator<Item = PlaylistItem> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let index = cursor?;
            let node = self.node(index);
            cursor = node.next;
            Some(PlaylistItem {
                id: self.handle(index),
                file: node.file.clone(),
                gain: node.gain,
            })
        })
    }

    /// Item handles in playlist order
    pub fn ids(&self) -> Vec<ItemId> {
        self.iter().map(|item| item.id).collect()
    }
}
