//! Gain scan configuration

use crate::error::{LoudnessError, Result};
use crate::REPLAYGAIN_REFERENCE_LUFS;
use serde::{Deserialize, Serialize};

/// Gain scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Seconds of audio decoded between progress callbacks (default: 2.0)
    ///
    /// Advisory: callbacks fire at the first buffer boundary past each interval.
    pub progress_interval_secs: f64,

    /// Target loudness gains are computed against (default: -18 LUFS)
    pub reference_lufs: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            progress_interval_secs: 2.0,
            reference_lufs: REPLAYGAIN_REFERENCE_LUFS,
        }
    }
}

impl ScanConfig {
    /// Check every value is usable
    pub fn validate(&self) -> Result<()> {
        if !(self.progress_interval_secs.is_finite() && self.progress_interval_secs > 0.0) {
            return Err(LoudnessError::InvalidConfig(format!(
                "progress_interval_secs must be positive, got {}",
                self.progress_interval_secs
            )));
        }
        if !self.reference_lufs.is_finite() {
            return Err(LoudnessError::InvalidConfig(
                "reference_lufs must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
