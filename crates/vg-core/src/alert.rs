//! Security alerts and the bounded alert log.

use crate::event::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default capacity of the in-memory alert log.
pub const DEFAULT_ALERT_LOG_CAP: usize = 500;

/// An alert raised by a triggered rule's `alert` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    /// Unique identifier.
    pub id: Uuid,
    /// Alert severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// The rule that raised the alert.
    pub rule_id: String,
    /// The event that triggered the rule, if any.
    pub event_id: Option<Uuid>,
    /// The incident the alert belongs to.
    pub incident_id: Option<Uuid>,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
}

/// Bounded, most-recent-first log of raised alerts.
pub struct AlertLog {
    alerts: RwLock<VecDeque<SecurityAlert>>,
    cap: usize,
}

impl AlertLog {
    /// Creates an alert log with the given capacity.
    pub fn new(cap: usize) -> Self {
        Self {
            alerts: RwLock::new(VecDeque::with_capacity(cap.min(64))),
            cap,
        }
    }

    /// Appends an alert, evicting the oldest past capacity.
    pub async fn push(&self, alert: SecurityAlert) {
        let mut alerts = self.alerts.write().await;
        alerts.push_front(alert);
        alerts.truncate(self.cap);
    }

    /// Returns up to `limit` most recent alerts.
    pub async fn recent(&self, limit: usize) -> Vec<SecurityAlert> {
        let alerts = self.alerts.read().await;
        alerts.iter().take(limit).cloned().collect()
    }

    /// Number of retained alerts.
    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_LOG_CAP)
    }
}
