//! Threat condition definitions.
//!
//! Each condition kind carries a strongly typed parameter struct and is
//! validated when a rule is loaded, so malformed configuration fails at
//! startup instead of silently never matching.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A predicate over recent events and/or a subject's behavior profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreatCondition {
    /// Burst of failed authentications from one subject/address.
    FailedAuthBurst(FailedAuthBurstParams),
    /// Event location implausibly far from every known location.
    GeoAnomaly(GeoAnomalyParams),
    /// Request rate above a raw threshold or the subject's baseline.
    RateAnomaly(RateAnomalyParams),
    /// Composite behavioral anomaly score above a threshold.
    BehaviorAnomaly(BehaviorAnomalyParams),
    /// Named access pattern detected in the recent-events window.
    SuspiciousPattern(SuspiciousPatternParams),
}

impl ThreatCondition {
    /// Stable kind name used in logs and counter keys.
    pub fn kind(&self) -> &'static str {
        match self {
            ThreatCondition::FailedAuthBurst(_) => "failed_auth_burst",
            ThreatCondition::GeoAnomaly(_) => "geo_anomaly",
            ThreatCondition::RateAnomaly(_) => "rate_anomaly",
            ThreatCondition::BehaviorAnomaly(_) => "behavior_anomaly",
            ThreatCondition::SuspiciousPattern(_) => "suspicious_pattern",
        }
    }

    /// Validates the condition's parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ThreatCondition::FailedAuthBurst(p) => {
                if p.threshold == 0 {
                    return Err("failed_auth_burst threshold must be positive".to_string());
                }
                if p.window_secs == 0 {
                    return Err("failed_auth_burst window must be positive".to_string());
                }
            }
            ThreatCondition::GeoAnomaly(p) => {
                if p.max_distance_km <= 0.0 {
                    return Err("geo_anomaly max_distance_km must be positive".to_string());
                }
            }
            ThreatCondition::RateAnomaly(p) => {
                if p.threshold == 0 {
                    return Err("rate_anomaly threshold must be positive".to_string());
                }
                if p.window_secs == 0 {
                    return Err("rate_anomaly window must be positive".to_string());
                }
            }
            ThreatCondition::BehaviorAnomaly(p) => {
                if p.threshold == 0 || p.threshold > 100 {
                    return Err("behavior_anomaly threshold must be in 1..=100".to_string());
                }
            }
            ThreatCondition::SuspiciousPattern(p) => {
                if p.window_secs == 0 {
                    return Err("suspicious_pattern window must be positive".to_string());
                }
                if p.patterns.is_empty() {
                    return Err("suspicious_pattern requires at least one pattern".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Parameters for the failed-authentication burst condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAuthBurstParams {
    /// Failures within the window that trigger the condition.
    pub threshold: u32,
    /// Counting window, seconds.
    pub window_secs: u64,
    /// Key the counter by (subject, source address) instead of the
    /// source address alone.
    #[serde(default)]
    pub check_user_and_ip: bool,
}

impl FailedAuthBurstParams {
    /// Counting window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Parameters for the geographic anomaly condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoAnomalyParams {
    /// Minimum distance (km) from every known location that counts as
    /// anomalous.
    pub max_distance_km: f64,
}

/// Parameters for the rate anomaly condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateAnomalyParams {
    /// Raw event-count threshold within the window.
    pub threshold: u32,
    /// Counting window, seconds.
    pub window_secs: u64,
    /// Key the counter by subject when attributable; falls back to the
    /// source address otherwise.
    #[serde(default = "default_true")]
    pub per_user: bool,
    /// Compare the windowed per-hour rate against the subject's
    /// baseline instead of the raw threshold when a profile exists.
    #[serde(default)]
    pub compare_to_baseline: bool,
}

impl RateAnomalyParams {
    /// Counting window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_true() -> bool {
    true
}

/// Parameters for the behavior anomaly condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorAnomalyParams {
    /// Anomaly score (0-100) at or above which the condition triggers.
    pub threshold: u8,
}

/// Named suspicious access patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// More than 10 download events in the window.
    BulkDownload,
    /// More than 20 credential-access events in the window.
    CredentialEnumeration,
    /// More than 100 events of any kind in the window.
    RapidAccess,
}

impl PatternKind {
    /// Stable pattern name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::BulkDownload => "bulk_download",
            PatternKind::CredentialEnumeration => "credential_enumeration",
            PatternKind::RapidAccess => "rapid_access",
        }
    }
}

/// Parameters for the suspicious pattern condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousPatternParams {
    /// Scan window over recent events, seconds.
    pub window_secs: u64,
    /// Patterns that trigger the condition when detected. All listed
    /// patterns must be present.
    pub patterns: Vec<PatternKind>,
}

impl SuspiciousPatternParams {
    /// Scan window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}
