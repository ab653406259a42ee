//! Player configuration

use crate::error::{PlaybackError, Result};
use cadence_core::AudioFormat;
use serde::{Deserialize, Serialize};

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Target amount of decoded audio held ahead of the play head (default: 0.2 s)
    pub lookahead_secs: f64,

    /// Frames handed to the sink per output period (default: 1024)
    pub period_frames: usize,

    /// Format the sink is expected to accept (default: 44.1 kHz stereo)
    pub output_format: AudioFormat,

    /// Maximum queued events before the oldest are dropped (default: 1024)
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.2,
            period_frames: 1024,
            output_format: AudioFormat::cd_quality(),
            event_capacity: 1024,
        }
    }
}

impl PlayerConfig {
    /// Check every value is usable
    pub fn validate(&self) -> Result<()> {
        if !(self.lookahead_secs.is_finite() && self.lookahead_secs > 0.0) {
            return Err(PlaybackError::InvalidConfig(format!(
                "lookahead_secs must be positive, got {}",
                self.lookahead_secs
            )));
        }
        if self.period_frames == 0 {
            return Err(PlaybackError::InvalidConfig(
                "period_frames must be positive".to_string(),
            ));
        }
        if self.output_format.sample_rate.as_hz() == 0 || self.output_format.channels == 0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "output format {:?} has no samples",
                self.output_format
            )));
        }
        if self.event_capacity == 0 {
            return Err(PlaybackError::InvalidConfig(
                "event_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Look-ahead target in frames of the output format
    pub fn lookahead_frames(&self) -> usize {
        self.output_format
            .secs_to_frames(self.lookahead_secs)
            .max(self.period_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lookahead_frames(), 8820);
        assert_eq!(config.period_frames, 1024);
    }

    #[test]
    fn rejects_non_positive_values() {
        let config = PlayerConfig {
            lookahead_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PlayerConfig {
            period_frames: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
