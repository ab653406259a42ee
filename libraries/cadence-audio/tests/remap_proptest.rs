//! Property tests for channel mapping

use cadence_audio::remap_channels;
use proptest::prelude::*;

fn interleaved(max_frames: usize) -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
    (1usize..=8, 1usize..=8, 0..=max_frames).prop_flat_map(|(from, to, frames)| {
        (
            Just(from),
            Just(to),
            prop::collection::vec(-1.0f32..=1.0, frames * from),
        )
    })
}

proptest! {
    #[test]
    fn frame_count_is_preserved((from, to, samples) in interleaved(64)) {
        let frames = samples.len() / from;
        let out = remap_channels(&samples, from, to);
        prop_assert_eq!(out.len(), frames * to);
    }

    #[test]
    fn output_stays_in_range((from, to, samples) in interleaved(64)) {
        let out = remap_channels(&samples, from, to);
        prop_assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn mono_source_reaches_every_channel(to in 1usize..=8, value in -1.0f32..=1.0) {
        let out = remap_channels(&[value], 1, to);
        prop_assert_eq!(out, vec![value; to]);
    }
}
