//! Player behaviour over synthetic sources and a real-time paced sink
//!
//! Timing-dependent checks poll with generous deadlines instead of fixed
//! sleeps so they hold on slow machines.

use cadence_core::testing::{MemoryTagStore, SlowDecoder, SyntheticDecoder, SyntheticSource};
use cadence_core::{
    db_to_gain, AudioBuffer, AudioDecoder, AudioFile, AudioFormat, AudioSink, CadenceError,
    SourceHandle,
};
use cadence_playback::{ItemId, NullSink, Player, PlayerConfig, PlayerEvent};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ===== Helpers =====

const DEADLINE: Duration = Duration::from_secs(10);

fn library(sources: &[(&str, f64)]) -> Arc<SyntheticDecoder> {
    let decoder = Arc::new(SyntheticDecoder::new());
    for (name, secs) in sources {
        decoder.add_constant(name, 0.25, *secs);
    }
    decoder
}

fn source(decoder: Arc<dyn AudioDecoder>, name: &str) -> SourceHandle {
    AudioFile::open(name, decoder, Arc::new(MemoryTagStore::new())).unwrap()
}

fn player_with(config: PlayerConfig) -> Player {
    Player::new(Box::new(NullSink::new(AudioFormat::cd_quality())), config).unwrap()
}

fn player() -> Player {
    player_with(PlayerConfig::default())
}

/// Sink that keeps every sample it is given, without pacing
#[derive(Default)]
struct RecordingSink {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl AudioSink for RecordingSink {
    fn format(&self) -> AudioFormat {
        AudioFormat::cd_quality()
    }

    fn write(&mut self, block: &AudioBuffer) -> cadence_core::Result<usize> {
        self.samples.lock().unwrap().extend_from_slice(&block.samples);
        Ok(block.frames())
    }

    fn flush(&mut self) {}
}

fn recording_player() -> (Player, Arc<Mutex<Vec<f32>>>) {
    let sink = RecordingSink::default();
    let samples = Arc::clone(&sink.samples);
    let player = Player::new(Box::new(sink), PlayerConfig::default()).unwrap();
    (player, samples)
}

fn count_samples(samples: &Mutex<Vec<f32>>, value: f32) -> usize {
    samples.lock().unwrap().iter().filter(|s| **s == value).count()
}

/// (playlist index, seconds) so positions compare in playback order
fn playback_order(player: &Player, position: (Option<ItemId>, f64)) -> (usize, f64) {
    let (item, secs) = position;
    let index = item
        .and_then(|id| player.items().iter().position(|i| i.id == id))
        .unwrap_or(0);
    (index, secs)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn drain_events(player: &Player) -> Vec<PlayerEvent> {
    std::iter::from_fn(|| player.event_poll()).collect()
}

fn now_playing_count(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == PlayerEvent::NowPlaying)
        .count()
}

// ===== Empty playlist =====

#[test]
fn empty_player_has_no_position_and_ignores_play() {
    let player = player();

    assert_eq!(player.position(), (None, 0.0));
    assert_eq!(player.decode_position(), (None, 0.0));
    assert_eq!(player.count(), 0);

    player.play();
    assert!(!player.playing());
    thread::sleep(Duration::from_millis(20));
    assert!(!player.event_peek(false));
}

#[test]
fn first_insert_becomes_current() {
    let decoder = library(&[("a", 1.0)]);
    let player = player();

    let a = player.insert(source(decoder, "a"), 0.0, None).unwrap();

    assert_eq!(player.position(), (Some(a), 0.0));
    assert_eq!(player.event_poll(), Some(PlayerEvent::NowPlaying));
    assert_eq!(player.event_poll(), None);
}

// ===== Handles =====

#[test]
fn removed_and_foreign_handles_are_rejected() {
    let decoder = library(&[("a", 1.0), ("b", 1.0)]);
    let first = player();
    let second = player();

    let a = first.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    first.remove(a).unwrap();
    assert!(matches!(
        first.remove(a),
        Err(CadenceError::InvalidReference(_))
    ));
    assert!(matches!(
        first.seek(a, 0.0),
        Err(CadenceError::InvalidReference(_))
    ));

    let b = second.insert(source(decoder, "b"), 0.0, None).unwrap();
    assert!(matches!(
        first.set_gain(b, -3.0),
        Err(CadenceError::InvalidReference(_))
    ));
}

#[test]
fn items_report_playlist_order_and_gain() {
    let decoder = library(&[("a", 1.0), ("b", 1.0), ("c", 1.0)]);
    let player = player();

    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let c = player.insert(source(decoder.clone(), "c"), 0.0, None).unwrap();
    let b = player.insert(source(decoder, "b"), -6.0, Some(c)).unwrap();

    let ids: Vec<ItemId> = player.items().iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![a, b, c]);
    assert!((player.item(b).unwrap().gain - 0.501_187).abs() < 1e-6);

    player.set_gain(b, 0.0).unwrap();
    assert!((player.item(b).unwrap().gain - 1.0).abs() < 1e-12);
}

// ===== Removal and seek =====

#[test]
fn removing_current_moves_to_successor_then_stops() {
    let decoder = library(&[("a", 1.0), ("b", 1.0)]);
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let b = player.insert(source(decoder, "b"), 0.0, None).unwrap();
    drain_events(&player);

    player.remove(a).unwrap();
    assert_eq!(player.position(), (Some(b), 0.0));
    assert_eq!(drain_events(&player), vec![PlayerEvent::NowPlaying]);

    player.remove(b).unwrap();
    assert_eq!(player.position(), (None, 0.0));
    assert!(!player.playing());
    assert_eq!(drain_events(&player), vec![PlayerEvent::NowPlaying]);
}

#[test]
fn removing_last_current_item_rewinds_to_head() {
    let decoder = library(&[("a", 1.0), ("b", 1.0)]);
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let b = player.insert(source(decoder, "b"), 0.0, None).unwrap();

    player.seek(b, 0.4).unwrap();
    player.remove(b).unwrap();

    assert_eq!(player.position(), (Some(a), 0.0));
    assert!(!player.playing());
}

#[test]
fn seek_then_removing_another_item_keeps_head() {
    let decoder = library(&[("a", 1.0), ("b", 1.0)]);
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let b = player.insert(source(decoder, "b"), 0.0, None).unwrap();
    drain_events(&player);

    player.seek(b, 0.5).unwrap();
    assert_eq!(drain_events(&player), vec![PlayerEvent::NowPlaying]);

    player.remove(a).unwrap();
    assert_eq!(player.position(), (Some(b), 0.5));
    assert_eq!(player.count(), 1);
    assert!(drain_events(&player).is_empty());
}

#[test]
fn seek_within_current_item_emits_nothing() {
    let decoder = library(&[("a", 1.0)]);
    let player = player();
    let a = player.insert(source(decoder, "a"), 0.0, None).unwrap();
    drain_events(&player);

    player.seek(a, 0.25).unwrap();
    assert_eq!(player.position(), (Some(a), 0.25));
    assert!(drain_events(&player).is_empty());
}

#[test]
fn clear_stops_and_empties() {
    let decoder = library(&[("a", 2.0), ("b", 2.0)]);
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    player.insert(source(decoder, "b"), 0.0, None).unwrap();
    player.play();
    assert!(wait_until(|| player.position().1 > 0.0));

    player.clear();

    assert!(!player.playing());
    assert_eq!(player.count(), 0);
    assert_eq!(player.position(), (None, 0.0));
    assert!(player.item(a).is_err());
}

// ===== Playback =====

#[test]
fn decode_position_never_trails_play_position() {
    let decoder = library(&[("a", 3.0)]);
    let player = player();
    let a = player.insert(source(decoder, "a"), 0.0, None).unwrap();
    player.play();

    assert!(wait_until(|| player.position().1 > 0.1));
    for _ in 0..20 {
        let (play_item, play_secs) = player.position();
        let (decode_item, decode_secs) = player.decode_position();
        assert_eq!(play_item, Some(a));
        assert_eq!(decode_item, Some(a));
        assert!(decode_secs >= play_secs, "{decode_secs} < {play_secs}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn decode_position_leads_across_seeks() {
    let decoder = library(&[("a", 3.0), ("b", 3.0), ("c", 3.0)]);
    let player = player();
    let items: Vec<ItemId> = ["a", "b", "c"]
        .iter()
        .map(|name| player.insert(source(decoder.clone(), name), 0.0, None).unwrap())
        .collect();
    player.play();

    for step in 0..12 {
        let target = items[(step * 2) % 3];
        let secs = (step as f64 * 0.37) % 2.5;
        player.seek(target, secs).unwrap();
        assert_eq!(player.position().0, Some(target));

        for _ in 0..4 {
            let play = playback_order(&player, player.position());
            let decode = playback_order(&player, player.decode_position());
            assert!(
                decode.0 > play.0 || (decode.0 == play.0 && decode.1 >= play.1),
                "step {step}: decode {decode:?} behind play {play:?}"
            );
            thread::sleep(Duration::from_millis(10));
        }
    }
    assert!(player.playing());
}

#[test]
fn removing_current_while_playing_continues_with_successor() {
    let decoder = library(&[("a", 3.0), ("b", 3.0)]);
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let b = player.insert(source(decoder, "b"), 0.0, None).unwrap();
    player.play();
    assert!(wait_until(|| player.position().1 > 0.1));
    drain_events(&player);

    player.remove(a).unwrap();
    assert_eq!(player.position().0, Some(b));
    assert!(player.playing());
    assert_eq!(now_playing_count(&drain_events(&player)), 1);

    assert!(wait_until(|| player.position().1 > 0.1));
    assert_eq!(player.position().0, Some(b));
    assert_eq!(player.decode_position().0, Some(b));
    assert_eq!(player.count(), 1);
}

#[test]
fn seek_before_play_keeps_every_frame() {
    let decoder = library(&[("a", 0.5)]);
    let (player, samples) = recording_player();
    let a = player.insert(source(decoder, "a"), 0.0, None).unwrap();

    player.seek(a, 0.0).unwrap();
    player.play();
    assert!(wait_until(|| !player.playing()));

    // Silence from underruns is not counted; every source frame must be
    assert_eq!(count_samples(&samples, 0.25), 22_050 * 2);
}

#[test]
fn song_after_clear_starts_from_its_first_frame() {
    let decoder = Arc::new(SyntheticDecoder::new());
    decoder.add_constant("long", 0.25, 60.0);
    decoder.add_constant("next", 0.5, 0.5);
    let (player, samples) = recording_player();
    player.insert(source(decoder.clone(), "long"), 0.0, None).unwrap();
    player.play();
    assert!(wait_until(|| player.position().1 > 0.1));

    player.clear();
    player.insert(source(decoder, "next"), 0.0, None).unwrap();
    player.play();
    assert!(wait_until(|| !player.playing()));

    assert_eq!(count_samples(&samples, 0.5), 22_050 * 2);
}

#[test]
fn volume_and_item_gain_scale_written_samples() {
    let decoder = Arc::new(SyntheticDecoder::new());
    decoder.add_constant("a", 0.5, 1.0);
    let (player, samples) = recording_player();
    player.set_volume(0.5);
    player.insert(source(decoder, "a"), -6.0, None).unwrap();
    player.play();

    assert!(wait_until(|| samples.lock().unwrap().iter().any(|s| *s != 0.0)));
    let first = samples
        .lock()
        .unwrap()
        .iter()
        .copied()
        .find(|s| *s != 0.0)
        .unwrap();
    let expected = 0.5 * 0.5 * db_to_gain(-6.0);
    assert!((f64::from(first) - expected).abs() < 1e-6, "{first} vs {expected}");
}

#[test]
fn plays_to_the_end_then_rewinds_paused() {
    let decoder = library(&[("a", 0.2), ("b", 0.2)]);
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    player.insert(source(decoder, "b"), 0.0, None).unwrap();
    player.play();
    assert!(player.playing());

    assert!(wait_until(|| !player.playing()));
    assert_eq!(player.position(), (Some(a), 0.0));

    // insert, a -> b, rewind b -> a
    let events = drain_events(&player);
    assert_eq!(now_playing_count(&events), 3, "{events:?}");
    assert_eq!(events[0], PlayerEvent::NowPlaying);
}

#[test]
fn pause_holds_position() {
    let decoder = library(&[("a", 3.0)]);
    let player = player();
    player.insert(source(decoder, "a"), 0.0, None).unwrap();
    player.play();
    assert!(wait_until(|| player.position().1 > 0.1));

    player.pause();
    assert!(!player.playing());
    // Let an in-flight period finish
    thread::sleep(Duration::from_millis(100));
    let held = player.position();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(player.position(), held);
}

#[test]
fn insert_ahead_of_decode_head_is_played_in_order() {
    let decoder = library(&[("a", 0.5), ("x", 0.3), ("b", 0.3)]);
    let player = player_with(PlayerConfig {
        lookahead_secs: 2.0,
        ..Default::default()
    });
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let b = player.insert(source(decoder.clone(), "b"), 0.0, None).unwrap();
    player.play();

    // Decoding runs well ahead of the half-second first item
    assert!(wait_until(|| player.decode_position().0 == Some(b)));
    let x = player.insert(source(decoder, "x"), 0.0, Some(b)).unwrap();
    assert_eq!(player.position().0, Some(a));

    let mut seen = vec![a];
    let finished = wait_until(|| {
        if let (Some(item), _) = player.position() {
            if seen.last() != Some(&item) {
                seen.push(item);
            }
        }
        !player.playing()
    });
    assert!(finished);
    assert_eq!(seen, vec![a, x, b, a]);
}

#[test]
fn append_after_decoding_finished_is_played() {
    let decoder = library(&[("a", 0.4), ("b", 0.2)]);
    let player = player_with(PlayerConfig {
        lookahead_secs: 2.0,
        ..Default::default()
    });
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    player.play();
    // The whole first item fits in the look-ahead window
    assert!(wait_until(|| player.decode_position().1 >= 0.39));

    let b = player.insert(source(decoder, "b"), 0.0, None).unwrap();
    assert!(wait_until(|| player.position().0 == Some(b) || !player.playing()));
    assert_eq!(player.position().0, Some(b));
    assert!(wait_until(|| !player.playing()));
    assert_eq!(player.position(), (Some(a), 0.0));
}

#[test]
fn slow_decoder_reports_underrun() {
    let inner = library(&[("a", 3.0)]);
    // Each 1024-frame buffer (23 ms of audio) takes 60 ms to decode
    let slow: Arc<dyn AudioDecoder> =
        Arc::new(SlowDecoder::new(inner, Duration::from_millis(60)));
    let player = player();
    player.insert(source(slow, "a"), 0.0, None).unwrap();
    assert_eq!(player.event_poll(), Some(PlayerEvent::NowPlaying));
    player.play();

    let events = player.events();
    let start = Instant::now();
    let mut underrun = false;
    while !underrun && start.elapsed() < DEADLINE {
        underrun = events.wait_timeout(Duration::from_millis(100))
            == Some(PlayerEvent::BufferUnderrun);
    }
    assert!(underrun);
}

#[test]
fn undecodable_item_is_skipped() {
    let decoder = library(&[("a", 0.2)]);
    decoder.add("broken", SyntheticSource::constant(0.1, 0.2).failing_after(0));
    let player = player();
    let a = player.insert(source(decoder.clone(), "a"), 0.0, None).unwrap();
    let broken = player.insert(source(decoder, "broken"), 0.0, None).unwrap();

    player.play();
    assert!(wait_until(|| !player.playing()));
    assert_eq!(player.position(), (Some(a), 0.0));
    assert_eq!(player.count(), 2);
    assert!(player.item(broken).is_ok());
}

#[test]
fn volume_is_clamped_at_zero() {
    let player = player();
    assert!((player.volume() - 1.0).abs() < f64::EPSILON);
    player.set_volume(-2.0);
    assert!(player.volume().abs() < f64::EPSILON);
    player.set_volume(0.5);
    assert!((player.volume() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn dropping_player_closes_event_channel() {
    let player = player();
    let events = player.events();
    let waiter = thread::spawn(move || events.wait());
    thread::sleep(Duration::from_millis(20));
    drop(player);
    assert_eq!(waiter.join().unwrap(), None);
}
