//! Configuration management for the quota ledger.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::ledger::FailurePolicy;

/// Main configuration for the ledger.
///
/// Loaded from an optional YAML file, then overridden by environment
/// variables with the upper-cased field name (`MAX_USERS`, `REDIS_URL`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Seats available in the registered-identity set
    pub max_users: u64,

    /// Global successful generations allowed per day
    pub quota_daily_limit: u64,

    /// Floor for the active-population estimate used by fair-share caps
    pub estimated_users: u64,

    /// Fixed UTC offset, in hours, at which the day rolls over
    pub day_offset_hours: i32,

    /// What policy-aware checks do when the store cannot answer
    pub on_store_unavailable: FailurePolicy,

    /// Prefix shared by every key the ledger writes
    pub key_prefix: String,

    /// Redis connection URL; without one the ledger runs unconfigured
    pub redis_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_users: default_max_users(),
            quota_daily_limit: default_quota_daily_limit(),
            estimated_users: default_estimated_users(),
            day_offset_hours: 0,
            on_store_unavailable: FailurePolicy::default(),
            key_prefix: default_key_prefix(),
            redis_url: None,
        }
    }
}

fn default_max_users() -> u64 {
    50
}

fn default_quota_daily_limit() -> u64 {
    1000
}

fn default_estimated_users() -> u64 {
    100
}

fn default_key_prefix() -> String {
    "aff".to_string()
}

impl LedgerConfig {
    /// Load configuration from an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading ledger configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: LedgerConfig = builder
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LedgerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LedgerError::Config(format!("Failed to parse ledger config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the accounting rules cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_users == 0 {
            return Err(LedgerError::Validation("max_users must be positive".into()));
        }
        if self.quota_daily_limit == 0 {
            return Err(LedgerError::Validation(
                "quota_daily_limit must be positive".into(),
            ));
        }
        if self.estimated_users == 0 {
            return Err(LedgerError::Validation(
                "estimated_users must be positive".into(),
            ));
        }
        if !(-12..=14).contains(&self.day_offset_hours) {
            return Err(LedgerError::Validation(format!(
                "day_offset_hours must be within -12..=14, got {}",
                self.day_offset_hours
            )));
        }
        if self.key_prefix.trim().is_empty() {
            return Err(LedgerError::Validation("key_prefix must not be empty".into()));
        }
        Ok(())
    }
}
