//! Configuration management with validation and defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Engine configuration.
///
/// `house_account` precedes the nested sections so the struct serializes
/// cleanly to TOML (plain values before tables).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account id of the single house counterparty.
    pub house_account: String,
    pub wager: WagerConfig,
    pub admission: AdmissionConfig,
    pub seed_cache: SeedCacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            house_account: "house".to_string(),
            wager: WagerConfig::default(),
            admission: AdmissionConfig::default(),
            seed_cache: SeedCacheConfig::default(),
        }
    }
}

/// Wager limits, shared by all game kinds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WagerConfig {
    pub min_wager: f64,
    pub max_wager: f64,
}

impl Default for WagerConfig {
    fn default() -> Self {
        Self {
            min_wager: 0.25,
            max_wager: 10.0,
        }
    }
}

/// Admission control: per-user mutual exclusion, queueing and cool-downs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Queued admission bound for game kinds that queue instead of
    /// fast-failing. Requests past this depth are rejected.
    pub queue_depth: usize,
    /// Cool-down window for placing a bet, milliseconds.
    pub bet_cooldown_ms: u64,
    /// Cool-down window for an in-game move, milliseconds.
    pub move_cooldown_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            queue_depth: 10,
            bet_cooldown_ms: 500,
            move_cooldown_ms: 300,
        }
    }
}

impl AdmissionConfig {
    pub fn bet_cooldown(&self) -> Duration {
        Duration::from_millis(self.bet_cooldown_ms)
    }

    pub fn move_cooldown(&self) -> Duration {
        Duration::from_millis(self.move_cooldown_ms)
    }
}

/// Idle-timeout cache of active seed commitments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedCacheConfig {
    /// Entries untouched for this long are evicted.
    pub idle_ttl_secs: u64,
    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for SeedCacheConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 30,
            sweep_interval_secs: 10,
        }
    }
}

impl SeedCacheConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        let config: EngineConfig =
            toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.wager.min_wager > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "wager.min_wager".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.wager.max_wager < self.wager.min_wager {
            return Err(ConfigError::InvalidValue {
                field: "wager.max_wager".to_string(),
                reason: "must be at least min_wager".to_string(),
            });
        }
        if self.admission.queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "admission.queue_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.seed_cache.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "seed_cache.sweep_interval_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.house_account.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "house_account".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_wager_range_rejected() {
        let mut config = EngineConfig::default();
        config.wager.max_wager = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_depth_rejected() {
        let mut config = EngineConfig::default();
        config.admission.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = EngineConfig::default();
        let raw = toml::to_string(&config).expect("serialize");
        let parsed: EngineConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(parsed.wager.min_wager, config.wager.min_wager);
        assert_eq!(parsed.admission.queue_depth, config.admission.queue_depth);
        assert_eq!(parsed.house_account, config.house_account);
    }
}
