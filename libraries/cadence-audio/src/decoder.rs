/// Audio decoder implementation using Symphonia
use crate::error::{AudioError, Result};
use cadence_core::{AudioBuffer, AudioDecoder, AudioFormat, DecodeStream, SampleRate};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Decoder capability backed by Symphonia
///
/// Supports: MP3, FLAC, OGG/Vorbis, WAV, AAC/M4A
///
/// Every `open` creates an independent `SymphoniaStream`, so the player and
/// the scanner can decode the same file concurrently.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self
    }

    /// Check the file extension against the formats compiled in
    pub fn supports_format(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "mp3" | "flac" | "ogg" | "oga" | "wav" | "m4a" | "aac"
                )
            })
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn open(&self, path: &Path) -> cadence_core::Result<Box<dyn DecodeStream>> {
        Ok(Box::new(SymphoniaStream::open(path)?))
    }
}

/// Streaming decode state for one open file
pub struct SymphoniaStream {
    /// Format reader (container parser)
    reader: Box<dyn FormatReader>,
    /// Audio decoder
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: AudioFormat,
    duration: Option<f64>,
    /// Container then codec short names
    format_names: Vec<String>,
    time_base: Option<TimeBase>,
    /// Frames decoded since the last seek, used when packets carry no timestamp
    position_frames: u64,
    /// Frames to drop before the requested seek target
    skip_frames: usize,
}

impl SymphoniaStream {
    /// Open a file and probe its default track
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }

        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::UnsupportedFormat(format!("Failed to probe file: {e}")))?;

        let reader = probed.format;
        let track = reader
            .default_track()
            .ok_or_else(|| AudioError::UnsupportedFormat("No audio tracks found".to_string()))?;

        let params = &track.codec_params;
        let sample_rate = params.sample_rate.unwrap_or(44_100);
        let channels = params.channels.map_or(2, |c| c.count() as u16);
        let track_id = track.id;
        let time_base = params.time_base;

        let duration = params.n_frames.map(|frames| match time_base {
            Some(tb) => time_to_secs(tb.calc_time(frames)),
            None => frames as f64 / f64::from(sample_rate),
        });

        let codecs = symphonia::default::get_codecs();
        let decoder = codecs
            .make(params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("Failed to create decoder: {e}")))?;

        let mut format_names: Vec<String> = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(container_name)
            .map(str::to_string)
            .into_iter()
            .collect();
        if let Some(codec) = codecs.get_codec(params.codec) {
            if !format_names.iter().any(|name| name == codec.short_name) {
                format_names.push(codec.short_name.to_string());
            }
        }

        debug!(
            path = %path.display(),
            sample_rate,
            channels,
            duration = ?duration,
            format = %format_names.join(","),
            "Opened Symphonia stream"
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            format: AudioFormat::new(SampleRate::new(sample_rate), channels),
            duration,
            format_names,
            time_base,
            position_frames: 0,
            skip_frames: 0,
        })
    }

    fn decode_next(&mut self) -> Result<Option<AudioBuffer>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let mut pts = match self.time_base {
                Some(tb) => time_to_secs(tb.calc_time(packet.ts())),
                None => self.format.frames_to_secs(self.position_frames as usize),
            };
            self.position_frames += frames as u64;

            let mut interleaved = SampleBuffer::<f32>::new(frames as u64, *decoded.spec());
            interleaved.copy_interleaved_ref(decoded);
            let mut samples = interleaved.samples().to_vec();

            // Accurate seeks land on the packet before the target
            if self.skip_frames > 0 {
                let skip = self.skip_frames.min(frames);
                self.skip_frames -= skip;
                samples.drain(..skip * self.format.channels as usize);
                pts += self.format.frames_to_secs(skip);
                if samples.is_empty() {
                    continue;
                }
            }

            return Ok(Some(AudioBuffer::new(samples, self.format, pts)));
        }
    }

    fn seek_to(&mut self, seconds: f64) -> Result<f64> {
        let target = match self.duration {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };

        let seeked = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::new(target.trunc() as u64, target.fract()),
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();

        let to_secs = |ts: u64| match self.time_base {
            Some(tb) => time_to_secs(tb.calc_time(ts)),
            None => ts as f64 / f64::from(self.format.sample_rate.as_hz()),
        };
        let actual = to_secs(seeked.actual_ts);
        let required = to_secs(seeked.required_ts);

        self.skip_frames = self.format.secs_to_frames(required - actual);
        self.position_frames = self.format.secs_to_frames(required) as u64;
        Ok(required)
    }
}

/// Container short name for a file extension
fn container_name(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => Some("mp3"),
        "flac" => Some("flac"),
        "ogg" | "oga" => Some("ogg"),
        "wav" | "wave" => Some("wav"),
        "m4a" | "mp4" => Some("mp4"),
        "aac" => Some("aac"),
        _ => None,
    }
}

fn time_to_secs(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}

impl DecodeStream for SymphoniaStream {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn format_names(&self) -> Vec<String> {
        self.format_names.clone()
    }

    fn next_frame(&mut self) -> cadence_core::Result<Option<AudioBuffer>> {
        Ok(self.decode_next()?)
    }

    fn seek(&mut self, seconds: f64) -> cadence_core::Result<f64> {
        Ok(self.seek_to(seconds)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_common_formats() {
        assert!(SymphoniaDecoder::supports_format(Path::new("test.mp3")));
        assert!(SymphoniaDecoder::supports_format(Path::new("test.FLAC")));
        assert!(SymphoniaDecoder::supports_format(Path::new("test.wav")));
        assert!(!SymphoniaDecoder::supports_format(Path::new("test.txt")));
        assert!(!SymphoniaDecoder::supports_format(Path::new("noext")));
    }

    #[test]
    fn open_nonexistent_file_is_io_error() {
        let err = SymphoniaDecoder::new()
            .open(Path::new("/nonexistent/file.mp3"))
            .err()
            .unwrap();
        assert!(matches!(err, cadence_core::CadenceError::Io(_)));
    }
}
