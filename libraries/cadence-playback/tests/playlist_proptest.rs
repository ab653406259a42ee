//! Property-based tests for the playlist arena
//!
//! Random insert/remove/clear sequences are mirrored against a `Vec` model;
//! after every step the linked order, length, neighbour links and handle
//! validity must agree with the model.

use cadence_core::testing::{MemoryTagStore, SyntheticDecoder};
use cadence_core::{AudioFile, SourceHandle};
use cadence_playback::{ItemId, PlaybackError, Playlist};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Append,
    /// Insert before the model item at this index (modulo length)
    InsertBefore(usize),
    /// Remove the model item at this index (modulo length)
    Remove(usize),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Append),
        3 => any::<usize>().prop_map(Op::InsertBefore),
        3 => any::<usize>().prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn source() -> SourceHandle {
    let decoder = Arc::new(SyntheticDecoder::new());
    decoder.add_constant("item", 0.5, 0.01);
    AudioFile::open("item", decoder, Arc::new(MemoryTagStore::new())).unwrap()
}

fn check_links(playlist: &Playlist, model: &[ItemId]) -> Result<(), TestCaseError> {
    prop_assert_eq!(playlist.ids(), model.to_vec());
    prop_assert_eq!(playlist.len(), model.len());
    prop_assert_eq!(playlist.head(), model.first().copied());
    prop_assert_eq!(playlist.tail(), model.last().copied());
    for (position, id) in model.iter().enumerate() {
        prop_assert_eq!(playlist.position_of(*id).unwrap(), position);
        prop_assert_eq!(
            playlist.prev(*id).unwrap(),
            position.checked_sub(1).map(|p| model[p])
        );
        prop_assert_eq!(playlist.next(*id).unwrap(), model.get(position + 1).copied());
    }
    Ok(())
}

proptest! {
    #[test]
    fn arena_matches_vec_model(ops in prop::collection::vec(op(), 1..80)) {
        let file = source();
        let mut playlist = Playlist::new();
        let mut model: Vec<ItemId> = Vec::new();
        let mut removed: Vec<ItemId> = Vec::new();

        for op in ops {
            match op {
                Op::Append => {
                    let id = playlist.insert(file.clone(), 0.0, None).unwrap();
                    model.push(id);
                }
                Op::InsertBefore(i) if !model.is_empty() => {
                    let at = i % model.len();
                    let id = playlist.insert(file.clone(), 0.0, Some(model[at])).unwrap();
                    model.insert(at, id);
                }
                Op::Remove(i) if !model.is_empty() => {
                    let id = model.remove(i % model.len());
                    playlist.remove(id).unwrap();
                    removed.push(id);
                }
                Op::Clear => {
                    playlist.clear();
                    removed.append(&mut model);
                }
                Op::InsertBefore(_) | Op::Remove(_) => {}
            }
            check_links(&playlist, &model)?;
        }

        for id in removed {
            prop_assert!(!playlist.contains(id));
            prop_assert!(
                matches!(playlist.remove(id), Err(PlaybackError::StaleItem(_))),
                "stale handle accepted"
            );
        }
    }

    #[test]
    fn handles_are_unique(count in 1usize..40, removals in prop::collection::vec(any::<usize>(), 0..20)) {
        let file = source();
        let mut playlist = Playlist::new();
        let mut issued = Vec::new();
        let mut live = Vec::new();

        for _ in 0..count {
            let id = playlist.insert(file.clone(), 0.0, None).unwrap();
            issued.push(id);
            live.push(id);
        }
        for r in removals {
            if live.is_empty() {
                break;
            }
            let id = live.remove(r % live.len());
            playlist.remove(id).unwrap();
            // Reuses the freed slot under a new generation
            let id = playlist.insert(file.clone(), 0.0, None).unwrap();
            issued.push(id);
            live.push(id);
        }

        let mut unique = issued.clone();
        unique.sort_by_key(ToString::to_string);
        unique.dedup();
        prop_assert_eq!(unique.len(), issued.len());
    }

    #[test]
    fn gain_round_trips_through_decibels(gain_db in -60.0f64..24.0) {
        let mut playlist = Playlist::new();
        let id = playlist.insert(source(), gain_db, None).unwrap();
        let linear = playlist.gain(id).unwrap();
        prop_assert!((cadence_core::gain_to_db(linear) - gain_db).abs() < 1e-9);
    }
}
