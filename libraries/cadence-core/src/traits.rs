/// Capability traits consumed by the player and the gain scanner
///
/// Codecs, tag formats and output devices live outside the engine. The
/// engine only sees these narrow interfaces.
use crate::error::Result;
use crate::types::{AudioBuffer, AudioFormat, Tag};
use std::path::Path;

/// Audio decoder capability
///
/// Opens independent decode cursors over a source. The player and the
/// scanner each open their own stream, so one source can be decoded by
/// several consumers at once.
pub trait AudioDecoder: Send + Sync {
    /// Open a source for streaming decode
    ///
    /// # Errors
    /// Returns `Io` if the source cannot be read and `Decode` if its
    /// format is not recognised
    fn open(&self, path: &Path) -> Result<Box<dyn DecodeStream>>;

    /// Determine the duration of a source in seconds
    ///
    /// The default implementation trusts the container header and falls
    /// back to decoding the whole stream when the header has no length.
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        let mut stream = self.open(path)?;
        if let Some(duration) = stream.duration() {
            return Ok(duration);
        }
        let mut end = 0.0_f64;
        while let Some(frame) = stream.next_frame()? {
            end = end.max(frame.end_pts());
        }
        Ok(end)
    }
}

/// An open decode cursor over one source
pub trait DecodeStream: Send {
    /// Format of the frames this stream produces
    fn format(&self) -> AudioFormat;

    /// Total duration in seconds, if the container declares it
    fn duration(&self) -> Option<f64>;

    /// Short names of the container and codec, container first
    ///
    /// Empty when the decoder cannot tell.
    fn format_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Decode the next frame of PCM
    ///
    /// Returns `Ok(None)` at end of source.
    fn next_frame(&mut self) -> Result<Option<AudioBuffer>>;

    /// Reposition the cursor
    ///
    /// Returns the actual position, which may differ from the request due
    /// to packet boundaries in compressed formats.
    fn seek(&mut self, seconds: f64) -> Result<f64>;
}

/// Tag capability: reads and persists a source's key/value entries
pub trait TagStore: Send + Sync {
    /// Read all entries in file order
    fn read_tags(&self, path: &Path) -> Result<Vec<Tag>>;

    /// Replace the stored entries with `tags`
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be written
    fn write_tags(&self, path: &Path, tags: &[Tag]) -> Result<()>;
}

/// Output sink capability
///
/// `write` may accept fewer frames than offered; the caller retries the
/// remainder later. This is the only backpressure signal the player gets.
pub trait AudioSink: Send {
    /// Format the sink expects to receive
    fn format(&self) -> AudioFormat;

    /// Push a block of PCM, returning the number of frames accepted
    fn write(&mut self, block: &AudioBuffer) -> Result<usize>;

    /// Drop any audio queued inside the sink
    fn flush(&mut self) {}
}
