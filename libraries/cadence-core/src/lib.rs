//! Cadence Core
//!
//! Backend-agnostic building blocks shared by the player, the gain scanner
//! and the platform outputs.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Source handles**: `AudioFile`, an open source plus its editable tag set
//! - **Capability traits**: `AudioDecoder`, `DecodeStream`, `TagStore`, `AudioSink`
//! - **Error handling**: unified `CadenceError` and `Result` types
//! - **Global init**: `init` / `set_log_level` for process-wide logging
//!
//! # Example
//!
//! ```rust
//! use cadence_core::{db_to_gain, gain_to_db, Tag, TagFlags, TagSet};
//!
//! let gain = db_to_gain(-6.0);
//! assert!((gain_to_db(gain) + 6.0).abs() < 1e-9);
//!
//! let mut tags = TagSet::from(vec![Tag::new("TITLE", "Intro")]);
//! tags.set("title", Some(" (Live)"), TagFlags::APPEND);
//! assert_eq!(tags.value("TITLE", TagFlags::NONE), Some("Intro (Live)"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod file;
pub mod gain;
pub mod logging;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types
pub use error::{CadenceError, Result};
pub use file::{AudioFile, SourceHandle};
pub use gain::{db_to_gain, gain_to_db};
pub use logging::{init, set_log_level, LogLevel};
pub use traits::{AudioDecoder, AudioSink, DecodeStream, TagStore};
pub use types::{AudioBuffer, AudioFormat, SampleRate, Tag, TagFlags, TagSet};
