/// Cadence - command-line player and ReplayGain scanner
use anyhow::Context;
use cadence_audio_desktop::CpalSink;
use cadence_core::{gain_to_db, AudioSink, LogLevel, TagFlags};
use cadence_loudness::{read_replaygain_tags, write_replaygain_tags, EntryState, GainScan};
use cadence_playback::{NullSink, Player, PlayerEvent};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

mod config;

use config::CliConfig;

/// How often `play` checks for events and the end of the playlist
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "cadence", version)]
#[command(about = "Play audio files and measure their loudness", long_about = None)]
struct Cli {
    /// More output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only report errors that stop the command
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play files in order
    Play {
        /// Files to enqueue
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Discard audio at real-time pace instead of using the output device
        #[arg(long)]
        null: bool,
        /// Apply stored album gain instead of track gain
        #[arg(long)]
        album: bool,
    },
    /// Measure ReplayGain for files scanned as one album
    Scan {
        /// Files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Store the results as ReplayGain tags
        #[arg(long)]
        write: bool,
    },
    /// Show and edit a file's tags
    Tags {
        /// File to inspect
        file: PathBuf,
        /// Set a tag, replacing any existing value
        #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
        /// Remove every tag with this key
        #[arg(long, value_name = "KEY")]
        delete: Vec<String>,
    },
}

impl Cli {
    fn log_level(&self, configured: LogLevel) -> LogLevel {
        match (self.quiet, self.verbose) {
            (true, _) => LogLevel::Error,
            (false, 0) => configured,
            (false, 1) => LogLevel::Info,
            (false, _) => LogLevel::Debug,
        }
    }
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{arg}'")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cadence_core::init(cli.log_level(config.log_level))?;

    match cli.command {
        Commands::Play { files, null, album } => play(&config, &files, null, album),
        Commands::Scan { files, write } => scan(&config, &files, write),
        Commands::Tags { file, set, delete } => tags(&file, &set, &delete),
    }
}

fn play(config: &CliConfig, files: &[PathBuf], null: bool, album: bool) -> anyhow::Result<()> {
    let mut player_config = config.player.clone();
    let sink: Box<dyn AudioSink> = if null {
        Box::new(NullSink::new(player_config.output_format))
    } else {
        let sink = CpalSink::open().context("failed to open output device")?;
        player_config.output_format = sink.format();
        Box::new(sink)
    };
    let player = Player::new(sink, player_config)?;

    for path in files {
        let file = match cadence_audio::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping file");
                continue;
            }
        };
        let gain_db = read_replaygain_tags(&file).playback_gain_db(album);
        player.insert(file, gain_db, None)?;
    }
    if player.count() == 0 {
        anyhow::bail!("no playable files");
    }

    player.play();
    let mut underruns = 0_u64;
    while player.playing() {
        while let Some(event) = player.event_poll() {
            match event {
                PlayerEvent::NowPlaying => {
                    if let (Some(id), _) = player.position() {
                        let item = player.item(id)?;
                        println!("Now playing: {}", item.file.path().display());
                    }
                }
                PlayerEvent::BufferUnderrun => underruns += 1,
            }
        }
        thread::sleep(EVENT_POLL_INTERVAL);
    }

    info!(underruns, "Playback finished");
    Ok(())
}

fn scan(config: &CliConfig, files: &[PathBuf], write: bool) -> anyhow::Result<()> {
    let mut scan = GainScan::new(config.scan.clone());
    scan.on_progress(|path: &PathBuf, fraction| {
        eprint!("\r{}: {:>3.0}%", path.display(), fraction * 100.0);
    });
    scan.on_complete(|path: &PathBuf, gain, peak| {
        eprint!("\r");
        println!(
            "{}: {:+.2} dB, peak {:.6}",
            path.display(),
            gain_to_db(gain),
            peak
        );
    });

    for path in files {
        match cadence_audio::open(path) {
            Ok(file) => scan.add(file, path.clone())?,
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping file"),
        }
    }

    let summary = scan.exec()?;
    if summary.failed() > 0 {
        warn!(failed = summary.failed(), "Some files could not be analyzed");
    }
    println!(
        "Album: {:+.2} dB, peak {:.6} ({} files)",
        summary.gain_db, summary.peak, summary.completed
    );

    if write {
        for result in summary
            .results
            .iter()
            .filter(|r| r.state == EntryState::Complete)
        {
            write_replaygain_tags(&result.file, result.track.as_ref(), summary.album.as_ref())
                .with_context(|| format!("failed to tag {}", result.userdata.display()))?;
            info!(path = %result.userdata.display(), "Wrote ReplayGain tags");
        }
    }
    Ok(())
}

fn tags(path: &Path, set: &[(String, String)], delete: &[String]) -> anyhow::Result<()> {
    let file = cadence_audio::open(path)?;

    for (key, value) in set {
        file.set_tag(key, Some(value.as_str()), TagFlags::NONE)?;
    }
    for key in delete {
        file.set_tag(key, None, TagFlags::NONE)?;
    }
    if file.is_dirty() {
        file.save()
            .with_context(|| format!("failed to save tags to {}", path.display()))?;
        info!(path = %path.display(), "Saved tags");
    }

    for tag in file.tags() {
        println!("{}={}", tag.key, tag.value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_key_value_pairs() {
        assert_eq!(
            parse_key_value("ARTIST=Someone = else").unwrap(),
            ("ARTIST".to_string(), "Someone = else".to_string())
        );
        assert_eq!(
            parse_key_value("COMMENT=").unwrap(),
            ("COMMENT".to_string(), String::new())
        );
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn verbosity_flags_override_configuration() {
        let cli = Cli::parse_from(["cadence", "-vv", "tags", "song.flac"]);
        assert_eq!(cli.log_level(LogLevel::Warning), LogLevel::Debug);

        let cli = Cli::parse_from(["cadence", "--quiet", "tags", "song.flac"]);
        assert_eq!(cli.log_level(LogLevel::Info), LogLevel::Error);

        let cli = Cli::parse_from(["cadence", "tags", "song.flac"]);
        assert_eq!(cli.log_level(LogLevel::Info), LogLevel::Info);
    }

    #[test]
    fn tags_subcommand_collects_edits() {
        let cli = Cli::parse_from([
            "cadence", "tags", "a.flac", "--set", "TITLE=Intro", "--set", "ARTIST=X", "--delete",
            "COMMENT",
        ]);
        match cli.command {
            Commands::Tags { set, delete, .. } => {
                assert_eq!(set.len(), 2);
                assert_eq!(delete, vec!["COMMENT".to_string()]);
            }
            _ => panic!("expected tags subcommand"),
        }
    }
}
