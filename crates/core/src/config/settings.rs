//! Runtime settings (TOML) with profile support.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{read_file, ConfigError};
use crate::retry::RetryPolicy;

/// Loop timing and retry policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSettings {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    #[serde(default)]
    pub keeper: LoopSettings,

    /// Snapshot reads
    #[serde(default)]
    pub read_retry: RetrySettings,

    /// Transaction submission
    #[serde(default = "RetrySettings::submission")]
    pub submit_retry: RetrySettings,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            keeper: LoopSettings::default(),
            read_retry: RetrySettings::default(),
            submit_retry: RetrySettings::submission(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSettings {
    /// Pause between passes over all pools
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl LoopSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySettings {
    /// Submissions back off longer; a dropped tx often needs a block.
    fn submission() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 2_000,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

impl KeeperSettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from the `KEEPER_SETTINGS` path if set, defaults otherwise.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("KEEPER_SETTINGS") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Log the current settings.
    pub fn log_settings(&self) {
        tracing::info!(
            profile = %self.profile,
            interval_secs = self.keeper.interval_secs,
            "Keeper settings loaded"
        );
        tracing::info!(
            read_attempts = self.read_retry.max_attempts,
            submit_attempts = self.submit_retry.max_attempts,
            max_delay_ms = self.read_retry.max_delay_ms,
            "Retry policies"
        );
    }
}
