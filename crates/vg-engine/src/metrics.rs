//! Engine metrics snapshot.

use serde::{Deserialize, Serialize};

/// Point-in-time counts exposed by the `getMetrics` query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Events in the recent-events window.
    pub recent_events: usize,
    /// Incidents retained in memory.
    pub total_incidents: usize,
    /// Non-terminal incidents.
    pub active_incidents: usize,
    /// Source addresses currently blocked.
    pub blocked_sources: usize,
    /// Subjects currently suspended.
    pub suspended_subjects: usize,
    /// Subjects with an outstanding step-up requirement.
    pub step_up_subjects: usize,
    /// Configured rules.
    pub rule_count: usize,
    /// Alerts retained in the alert log.
    pub alerts_retained: usize,
    /// Notifications published since startup.
    pub notifications_published: u64,
}
