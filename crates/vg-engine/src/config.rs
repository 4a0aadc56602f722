//! Engine configuration.
//!
//! YAML-loadable configuration for retention windows, caps, timeouts,
//! and sweeper intervals, plus an optional rules file merged over the
//! built-in rule set. Everything is validated at load time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use vg_rules::{RuleError, ThreatRule};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Sweeper task intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Enforcement marker sweep interval, seconds.
    pub enforcement_interval_secs: u64,
    /// Profile re-evaluation interval, seconds.
    pub profile_interval_secs: u64,
    /// Retention purge / auto-resolve interval, seconds.
    pub retention_interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enforcement_interval_secs: 10,
            profile_interval_secs: 60,
            retention_interval_secs: 3600,
        }
    }
}

impl SweeperConfig {
    /// Enforcement sweep interval as a [`Duration`].
    pub fn enforcement_interval(&self) -> Duration {
        Duration::from_secs(self.enforcement_interval_secs)
    }

    /// Profile re-evaluation interval as a [`Duration`].
    pub fn profile_interval(&self) -> Duration {
        Duration::from_secs(self.profile_interval_secs)
    }

    /// Retention interval as a [`Duration`].
    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days recorded events are retained.
    pub event_retention_days: u32,
    /// Days incidents are retained after creation.
    pub incident_retention_days: u32,
    /// Hours after which an active incident is auto-resolved.
    pub auto_resolve_after_hours: u32,
    /// Capacity of the in-memory recent-events window.
    pub recent_events_cap: usize,
    /// Capacity of the in-memory alert log.
    pub alert_log_cap: usize,
    /// Notification bus channel capacity.
    pub bus_capacity: usize,
    /// Timeout for one geo resolution call, seconds.
    pub geo_timeout_secs: u64,
    /// Timeout for one webhook call, seconds.
    pub webhook_timeout_secs: u64,
    /// Timeout for one response action, seconds.
    pub action_timeout_secs: u64,
    /// Shared secret for webhook payload signing.
    pub webhook_secret: Option<String>,
    /// Trust score penalty applied to a subject per attributed trigger.
    pub trust_penalty: u8,
    /// Sweeper intervals.
    pub sweeper: SweeperConfig,
    /// Optional YAML file with additional rules, merged over the
    /// built-ins by id.
    pub rules_file: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_retention_days: 30,
            incident_retention_days: 30,
            auto_resolve_after_hours: 24,
            recent_events_cap: 1000,
            alert_log_cap: 500,
            bus_capacity: 256,
            geo_timeout_secs: 5,
            webhook_timeout_secs: 10,
            action_timeout_secs: 30,
            webhook_secret: None,
            trust_penalty: 5,
            sweeper: SweeperConfig::default(),
            rules_file: None,
        }
    }
}

impl EngineConfig {
    /// Loads and validates configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_retention_days == 0 {
            return Err(ConfigError::InvalidValue(
                "event_retention_days must be positive".to_string(),
            ));
        }
        if self.incident_retention_days == 0 {
            return Err(ConfigError::InvalidValue(
                "incident_retention_days must be positive".to_string(),
            ));
        }
        if self.auto_resolve_after_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "auto_resolve_after_hours must be positive".to_string(),
            ));
        }
        if self.recent_events_cap == 0 {
            return Err(ConfigError::InvalidValue(
                "recent_events_cap must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Event retention as a [`Duration`].
    pub fn event_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.event_retention_days) * 24 * 3600)
    }

    /// Incident retention as a [`Duration`].
    pub fn incident_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.incident_retention_days) * 24 * 3600)
    }

    /// Auto-resolve age as a chrono duration.
    pub fn auto_resolve_after(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.auto_resolve_after_hours))
    }

    /// Geo resolution timeout as a [`Duration`].
    pub fn geo_timeout(&self) -> Duration {
        Duration::from_secs(self.geo_timeout_secs)
    }

    /// Webhook timeout as a [`Duration`].
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    /// Action timeout as a [`Duration`].
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

/// Schema of a rules YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesFile {
    /// Rule definitions.
    pub rules: Vec<ThreatRule>,
}

/// Loads and validates rules from a YAML file.
pub fn load_rules_file(path: impl AsRef<Path>) -> Result<Vec<ThreatRule>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let file: RulesFile = serde_yaml::from_str(&raw)?;
    for rule in &file.rules {
        rule.validate()?;
    }
    Ok(file.rules)
}

/// Merges configured rules over the base set, replacing by id.
pub fn merge_rules(base: Vec<ThreatRule>, overrides: Vec<ThreatRule>) -> Vec<ThreatRule> {
    let mut merged = base;
    for rule in overrides {
        match merged.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => merged.push(rule),
        }
    }
    merged
}
