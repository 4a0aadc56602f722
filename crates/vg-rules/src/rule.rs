//! Threat rule definitions and the built-in rule set.

use crate::action::{
    ActionKind, AlertParams, BlockSourceParams, LogParams, RequireStepUpParams,
    SuspendSubjectParams, ThreatAction,
};
use crate::condition::{
    BehaviorAnomalyParams, FailedAuthBurstParams, GeoAnomalyParams, PatternKind,
    RateAnomalyParams, SuspiciousPatternParams, ThreatCondition,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use vg_core::event::Severity;

/// Errors raised when loading or mutating rules.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule '{rule}' has an invalid condition: {reason}")]
    InvalidCondition { rule: String, reason: String },

    #[error("Rule '{rule}' has an invalid action: {reason}")]
    InvalidAction { rule: String, reason: String },

    #[error("Rule '{rule}' must declare at least one condition")]
    NoConditions { rule: String },

    #[error("Rule '{rule}' must declare at least one action")]
    NoActions { rule: String },

    #[error("Rule id must not be empty")]
    EmptyId,

    #[error("Rule not found: {0}")]
    NotFound(String),
}

/// A named set of AND-ed conditions plus an ordered action list and a
/// cooldown.
///
/// The cooldown is keyed by rule id alone: while it is in force, the
/// rule is skipped for every subject, not just the one that triggered
/// it. That matches the observed behavior of the system this engine
/// replaces; a `(rule, subject)` cooldown key is the likely future
/// refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRule {
    /// Stable identifier, also the cooldown key.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the rule detects.
    #[serde(default)]
    pub description: String,
    /// Severity inherited by incidents this rule creates.
    pub severity: Severity,
    /// Disabled rules are skipped entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Conditions; all must hold for the rule to trigger.
    pub conditions: Vec<ThreatCondition>,
    /// Actions executed in order when the rule triggers.
    pub actions: Vec<ThreatAction>,
    /// Minimum interval between successive triggers, seconds.
    pub cooldown_secs: u64,
}

fn default_true() -> bool {
    true
}

impl ThreatRule {
    /// Creates an empty rule; add conditions and actions with the
    /// builder methods.
    pub fn new(id: impl Into<String>, name: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            severity,
            enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
            cooldown_secs: 300,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a condition.
    pub fn with_condition(mut self, condition: ThreatCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Appends an action.
    pub fn with_action(mut self, action: ThreatAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Sets the cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = cooldown.as_secs();
        self
    }

    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Validates the rule and all its conditions and actions.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.is_empty() {
            return Err(RuleError::EmptyId);
        }
        if self.conditions.is_empty() {
            return Err(RuleError::NoConditions {
                rule: self.id.clone(),
            });
        }
        if self.actions.is_empty() {
            return Err(RuleError::NoActions {
                rule: self.id.clone(),
            });
        }
        for condition in &self.conditions {
            condition.validate().map_err(|reason| RuleError::InvalidCondition {
                rule: self.id.clone(),
                reason,
            })?;
        }
        for action in &self.actions {
            action.validate().map_err(|reason| RuleError::InvalidAction {
                rule: self.id.clone(),
                reason,
            })?;
        }
        Ok(())
    }
}

/// The five built-in rules the engine ships with.
pub fn builtin_rules() -> Vec<ThreatRule> {
    vec![
        ThreatRule::new("failed_auth_burst", "Failed authentication burst", Severity::High)
            .with_description(
                "Five or more failed logins from one subject and address within five minutes",
            )
            .with_condition(ThreatCondition::FailedAuthBurst(FailedAuthBurstParams {
                threshold: 5,
                window_secs: 300,
                check_user_and_ip: true,
            }))
            .with_action(ThreatAction::new(ActionKind::BlockSource(
                BlockSourceParams { duration_secs: 3600 },
            )))
            .with_action(ThreatAction::new(ActionKind::Alert(AlertParams {
                severity: Severity::High,
                message: "Failed authentication burst detected".to_string(),
            })))
            .with_cooldown(Duration::from_secs(600)),
        ThreatRule::new("geo_anomaly", "Impossible travel", Severity::Medium)
            .with_description(
                "Activity from a location implausibly far from every known location",
            )
            .with_condition(ThreatCondition::GeoAnomaly(GeoAnomalyParams {
                max_distance_km: 1000.0,
            }))
            .with_action(ThreatAction::new(ActionKind::RequireStepUp(
                RequireStepUpParams { duration_secs: 86400 },
            )))
            .with_action(ThreatAction::new(ActionKind::Alert(AlertParams {
                severity: Severity::Medium,
                message: "Geographic anomaly detected".to_string(),
            })))
            .with_cooldown(Duration::from_secs(1800)),
        ThreatRule::new("api_rate_anomaly", "API rate anomaly", Severity::Medium)
            .with_description("Request rate far above the subject's baseline")
            .with_condition(ThreatCondition::RateAnomaly(RateAnomalyParams {
                threshold: 1000,
                window_secs: 3600,
                per_user: true,
                compare_to_baseline: true,
            }))
            .with_action(ThreatAction::new(ActionKind::Alert(AlertParams {
                severity: Severity::Medium,
                message: "API usage rate anomaly detected".to_string(),
            })))
            .with_action(ThreatAction::new(ActionKind::Log(LogParams::default())))
            .with_cooldown(Duration::from_secs(900)),
        ThreatRule::new(
            "credential_access_anomaly",
            "Credential access anomaly",
            Severity::High,
        )
        .with_description("Credential enumeration across many providers")
        .with_condition(ThreatCondition::SuspiciousPattern(SuspiciousPatternParams {
            window_secs: 3600,
            patterns: vec![PatternKind::CredentialEnumeration],
        }))
        .with_condition(ThreatCondition::BehaviorAnomaly(BehaviorAnomalyParams {
            threshold: 35,
        }))
        .with_action(ThreatAction::new(ActionKind::RequireStepUp(
            RequireStepUpParams { duration_secs: 3600 },
        )))
        .with_action(ThreatAction::new(ActionKind::Alert(AlertParams {
            severity: Severity::High,
            message: "Anomalous credential access detected".to_string(),
        })))
        .with_cooldown(Duration::from_secs(900)),
        ThreatRule::new("data_exfiltration", "Data exfiltration pattern", Severity::Critical)
            .with_description("Bulk downloads characteristic of data exfiltration")
            .with_condition(ThreatCondition::SuspiciousPattern(SuspiciousPatternParams {
                window_secs: 600,
                patterns: vec![PatternKind::BulkDownload],
            }))
            .with_action(ThreatAction::new(ActionKind::SuspendSubject(
                SuspendSubjectParams { duration_secs: 3600 },
            )))
            .with_action(ThreatAction::new(ActionKind::Alert(AlertParams {
                severity: Severity::Critical,
                message: "Possible data exfiltration in progress".to_string(),
            })))
            .with_action(ThreatAction::new(ActionKind::Log(LogParams::default())))
            .with_cooldown(Duration::from_secs(1800)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_valid_and_unique() {
        let rules = builtin_rules();
        assert_eq!(rules.len(), 5);

        let mut ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);

        for rule in &rules {
            rule.validate().unwrap();
            assert!(rule.enabled);
        }
    }

    #[test]
    fn validation_requires_conditions_and_actions() {
        let empty = ThreatRule::new("r", "r", Severity::Low);
        assert!(matches!(
            empty.validate(),
            Err(RuleError::NoConditions { .. })
        ));

        let no_actions = ThreatRule::new("r", "r", Severity::Low).with_condition(
            ThreatCondition::BehaviorAnomaly(BehaviorAnomalyParams { threshold: 50 }),
        );
        assert!(matches!(
            no_actions.validate(),
            Err(RuleError::NoActions { .. })
        ));
    }

    #[test]
    fn rule_yaml_round_trip() {
        let rule = builtin_rules().remove(0);
        let yaml = serde_yaml::to_string(&rule).unwrap();
        let back: ThreatRule = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.id, rule.id);
        assert_eq!(back.conditions.len(), rule.conditions.len());
        assert_eq!(back.actions.len(), rule.actions.len());
        back.validate().unwrap();
    }
}
