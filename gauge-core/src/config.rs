//! Condition configuration types.
//!
//! Provides per-instance configuration for violator staleness tracking and
//! assessment reset behavior. Every section deserializes with defaults so a
//! partial TOML document is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentLevel;
use crate::error::ConfigError;

/// Main configuration for a condition instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaugeConfig {
    /// Violator staleness tracking.
    pub violators: ViolatorConfig,
    /// Assessment level defaults and auto-reset.
    pub assessment: AssessmentConfig,
}

impl GaugeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.violators.validate()
    }
}

/// Configuration for violator staleness sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolatorConfig {
    /// Milliseconds without a refresh before a violator or dependency is stale.
    pub stale_after_ms: u64,
    /// Milliseconds between staleness sweeps.
    pub sweep_interval_ms: u64,
}

impl ViolatorConfig {
    pub const DEFAULT_STALE_AFTER_MS: u64 = 10_000;
    pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;

    /// Staleness window as a duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_after_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "violators.stale_after_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "violators.sweep_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ViolatorConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: Self::DEFAULT_STALE_AFTER_MS,
            sweep_interval_ms: Self::DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

/// Assessment state machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Level the condition starts in and resets back to.
    pub default_level: AssessmentLevel,
    /// Milliseconds of inactivity before resetting to the default level.
    /// Zero disables the reset timer.
    pub reset_delay_ms: u64,
}

impl AssessmentConfig {
    /// Reset delay, or `None` when auto-reset is disabled.
    pub fn reset_delay(&self) -> Option<Duration> {
        (self.reset_delay_ms > 0).then(|| Duration::from_millis(self.reset_delay_ms))
    }
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            default_level: AssessmentLevel::Unknown,
            reset_delay_ms: 0,
        }
    }
}
