/// CLI configuration
///
/// Values come from defaults, then an optional TOML file, then `CADENCE_*`
/// environment variables (nested fields joined with `__`, for example
/// `CADENCE_PLAYER__LOOKAHEAD_SECS=0.5`).
use cadence_core::{CadenceError, LogLevel, Result};
use cadence_loudness::ScanConfig;
use cadence_playback::PlayerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Verbosity when neither `-v` nor `-q` is given
    pub log_level: LogLevel,
    pub player: PlayerConfig,
    pub scan: ScanConfig,
}

impl CliConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path).required(true));
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = settings
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| CadenceError::config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.player.validate()?;
        self.scan.validate()?;
        Ok(())
    }
}
