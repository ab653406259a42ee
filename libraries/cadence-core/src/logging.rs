//! Process-wide logging initialization
//!
//! `init` installs a `tracing-subscriber` registry whose filter can be
//! swapped at runtime, so verbosity can be changed after startup without
//! reinstalling the subscriber.

use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, reload, EnvFilter, Registry};

/// Logging verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No output at all
    Quiet,
    /// Errors only
    Error,
    /// Warnings and errors (default)
    #[default]
    Warning,
    /// Informational messages such as track changes
    Info,
    /// Everything including per-frame tracing, for development
    Debug,
}

impl LogLevel {
    fn level_filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::TRACE,
        }
    }

    /// Build the filter for this level, layering any `RUST_LOG` directives on top
    fn env_filter(self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level_filter().into())
            .from_env_lossy()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quiet => "quiet",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "off" => Ok(Self::Quiet),
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" | "trace" => Ok(Self::Debug),
            other => Err(CadenceError::config(format!("unknown log level '{other}'"))),
        }
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: Mutex<Option<FilterHandle>> = Mutex::new(None);

/// Initialize logging for the process
///
/// Call once before using the player or the scanner. Calling again only
/// changes the level.
///
/// # Errors
/// Returns `InvalidState` if the host application already installed a
/// different global subscriber
pub fn init(level: LogLevel) -> Result<()> {
    let mut slot = FILTER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = slot.as_ref() {
        return reload_filter(handle, level);
    }

    let (filter, handle) = reload::Layer::new(level.env_filter());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer::layer().with_target(false))
        .try_init()
        .map_err(|e| CadenceError::invalid_state(format!("logging already initialized: {e}")))?;

    *slot = Some(handle);
    tracing::debug!(%level, "Logging initialized");
    Ok(())
}

/// Change verbosity after `init`
///
/// # Errors
/// Returns `InvalidState` if `init` has not run
pub fn set_log_level(level: LogLevel) -> Result<()> {
    let slot = FILTER.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(handle) => reload_filter(handle, level),
        None => Err(CadenceError::invalid_state("logging not initialized")),
    }
}

fn reload_filter(handle: &FilterHandle, level: LogLevel) -> Result<()> {
    handle
        .reload(level.env_filter())
        .map_err(|e| CadenceError::invalid_state(format!("failed to change log level: {e}")))
}
