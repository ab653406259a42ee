//! Domain types shared by every Cadence crate

pub mod audio;
pub mod tags;

pub use audio::{AudioBuffer, AudioFormat, SampleRate};
pub use tags::{Tag, TagFlags, TagSet};
