use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::constants::{ledger, service};
use crate::error::ConfigError;
use crate::ledger::ReplayOptions;

fn default_tolerance() -> Decimal {
    ledger::RECONCILE_TOLERANCE
}

fn default_contract_multiplier() -> u32 {
    ledger::CONTRACT_MULTIPLIER
}

fn default_event_log_path() -> String {
    service::DEFAULT_EVENT_LOG_PATH.to_string()
}

fn default_channel_capacity() -> usize {
    service::SNAPSHOT_CHANNEL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_tolerance")]
    pub reconcile_tolerance: Decimal,

    #[serde(default = "default_contract_multiplier")]
    pub contract_multiplier: u32,

    /// Year reported as year-to-date. The binary uses the current year when unset.
    #[serde(default)]
    pub ytd_year: Option<i32>,

    #[serde(default = "default_event_log_path")]
    pub event_log_path: String,

    #[serde(default = "default_channel_capacity")]
    pub snapshot_channel_capacity: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_tolerance: default_tolerance(),
            contract_multiplier: default_contract_multiplier(),
            ytd_year: None,
            event_log_path: default_event_log_path(),
            snapshot_channel_capacity: default_channel_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_tolerance < Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "reconcile_tolerance must be >= 0, got {}",
                self.reconcile_tolerance
            )));
        }
        if self.contract_multiplier == 0 {
            return Err(ConfigError::Invalid("contract_multiplier must be > 0".to_string()));
        }
        if self.snapshot_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_channel_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Replay options, with `current_year` standing in for an unset `ytd_year`
    pub fn replay_options(&self, current_year: i32) -> ReplayOptions {
        ReplayOptions {
            ytd_year: self.ytd_year.unwrap_or(current_year),
            reconcile_tolerance: self.reconcile_tolerance,
            contract_multiplier: self.contract_multiplier,
        }
    }
}
