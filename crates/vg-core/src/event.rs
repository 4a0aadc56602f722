//! Security event data models.
//!
//! A [`SecurityEvent`] is immutable once materialized by the recorder;
//! only the `resolved` flag and the applied `response_actions` list may
//! be appended to afterwards.

use crate::geo::GeoLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use uuid::Uuid;

/// Well-known sub-category (action) strings.
pub mod actions {
    /// A successful authentication attempt.
    pub const LOGIN_SUCCESS: &str = "login_success";
    /// A failed authentication attempt.
    pub const LOGIN_FAILED: &str = "login_failed";
    /// A data download.
    pub const DOWNLOAD: &str = "download";
}

/// High-level category of a security-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Login attempts and session establishment.
    Authentication,
    /// Reads of stored credentials or secrets.
    CredentialAccess,
    /// Calls against the product API surface.
    ApiUsage,
    /// Administrative or host-level access.
    SystemAccess,
    /// Reads and exports of user data.
    DataAccess,
}

impl EventCategory {
    /// Stable string form used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Authentication => "authentication",
            EventCategory::CredentialAccess => "credential_access",
            EventCategory::ApiUsage => "api_usage",
            EventCategory::SystemAccess => "system_access",
            EventCategory::DataAccess => "data_access",
        }
    }
}

/// Severity of an event, rule, or incident.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable string form used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Derives a severity band from a 0-100 risk score.
    pub fn from_risk_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Severity::Critical,
            60..=79 => Severity::High,
            40..=59 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Partial event description accepted by the recorder.
///
/// The recorder fills in identity, timestamp, location, risk score, and
/// severity (when no hint is given) to materialize a [`SecurityEvent`].
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// High-level category.
    pub category: EventCategory,
    /// Sub-category, e.g. `login_failed` or `download`.
    pub action: String,
    /// Subject (user) identifier, if the event is attributable.
    pub user_id: Option<String>,
    /// Source address the event originated from.
    pub source_ip: IpAddr,
    /// Client descriptor (user agent or equivalent).
    pub user_agent: String,
    /// Optional severity hint; derived from the risk score when absent.
    pub severity: Option<Severity>,
    /// Free-form detail map.
    pub details: HashMap<String, serde_json::Value>,
}

impl NewEvent {
    /// Creates a new partial event.
    pub fn new(category: EventCategory, action: impl Into<String>, source_ip: IpAddr) -> Self {
        Self {
            category,
            action: action.into(),
            user_id: None,
            source_ip,
            user_agent: String::new(),
            severity: None,
            details: HashMap::new(),
        }
    }

    /// Attributes the event to a subject.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the client descriptor.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Provides an explicit severity hint.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Adds a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// A fully materialized security event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// High-level category.
    pub category: EventCategory,
    /// Sub-category, e.g. `login_failed`.
    pub action: String,
    /// Subject (user) identifier, if attributable.
    pub user_id: Option<String>,
    /// Source address.
    pub source_ip: IpAddr,
    /// Client descriptor.
    pub user_agent: String,
    /// Resolved location, if geo resolution succeeded.
    pub location: Option<GeoLocation>,
    /// Severity band.
    pub severity: Severity,
    /// Free-form detail map.
    pub details: HashMap<String, serde_json::Value>,
    /// Heuristic risk score, clamped to 0-100. Computed exactly once.
    pub risk_score: u8,
    /// Whether the event has been marked resolved.
    pub resolved: bool,
    /// Identifiers of response actions applied because of this event.
    pub response_actions: Vec<String>,
}

impl SecurityEvent {
    /// Whether this is a failed authentication attempt.
    pub fn is_failed_authentication(&self) -> bool {
        self.category == EventCategory::Authentication && self.action == actions::LOGIN_FAILED
    }

    /// Whether this is a successful authentication.
    pub fn is_successful_authentication(&self) -> bool {
        self.category == EventCategory::Authentication && self.action == actions::LOGIN_SUCCESS
    }

    /// Whether this is a data download.
    pub fn is_download(&self) -> bool {
        self.category == EventCategory::DataAccess && self.action == actions::DOWNLOAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(category: EventCategory, action: &str) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            action: action.to_string(),
            user_id: Some("u1".to_string()),
            source_ip: "10.0.0.5".parse().unwrap(),
            user_agent: "test".to_string(),
            location: None,
            severity: Severity::Low,
            details: HashMap::new(),
            risk_score: 0,
            resolved: false,
            response_actions: Vec::new(),
        }
    }

    #[test]
    fn auth_classification() {
        assert!(event(EventCategory::Authentication, actions::LOGIN_FAILED)
            .is_failed_authentication());
        assert!(event(EventCategory::Authentication, actions::LOGIN_SUCCESS)
            .is_successful_authentication());
        assert!(!event(EventCategory::ApiUsage, actions::LOGIN_FAILED).is_failed_authentication());
    }

    #[test]
    fn severity_bands_from_risk_score() {
        assert_eq!(Severity::from_risk_score(0), Severity::Low);
        assert_eq!(Severity::from_risk_score(45), Severity::Medium);
        assert_eq!(Severity::from_risk_score(60), Severity::High);
        assert_eq!(Severity::from_risk_score(100), Severity::Critical);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn event_serde_round_trip() {
        let mut e = event(EventCategory::DataAccess, actions::DOWNLOAD);
        e.location = Some(GeoLocation::at(37.7, -122.4));
        let json = serde_json::to_string(&e).unwrap();
        let back: SecurityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, e.id);
        assert_eq!(back.category, EventCategory::DataAccess);
        assert!(back.is_download());
    }
}
