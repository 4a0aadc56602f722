//! Internal notification bus.
//!
//! Typed publish/subscribe over a Tokio broadcast channel. Subscribers
//! are external collaborators (alerting UI, compliance reporting); the
//! engine's core logic never depends on anyone listening, so publishes
//! to an empty bus are not errors.

use crate::alert::SecurityAlert;
use crate::event::{Severity, SecurityEvent};
use crate::incident::IncidentStatus;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default broadcast channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Notifications emitted by the engine, one variant per topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecurityNotification {
    /// A security event was recorded.
    EventRecorded(SecurityEvent),
    /// A rule fired and an incident was created.
    IncidentCreated {
        incident_id: Uuid,
        rule_id: String,
        severity: Severity,
    },
    /// An incident's status or timeline changed.
    IncidentUpdated {
        incident_id: Uuid,
        status: IncidentStatus,
    },
    /// A source address was blocked.
    SourceBlocked {
        source_ip: IpAddr,
        duration_secs: u64,
    },
    /// A subject was suspended.
    SubjectSuspended {
        user_id: String,
        duration_secs: u64,
    },
    /// A subject must complete step-up authentication.
    StepUpRequired {
        user_id: String,
        duration_secs: u64,
    },
    /// An alert was raised.
    AlertRaised(SecurityAlert),
}

impl SecurityNotification {
    /// Topic name for external consumers.
    pub fn topic(&self) -> &'static str {
        match self {
            SecurityNotification::EventRecorded(_) => "security-event",
            SecurityNotification::IncidentCreated { .. } => "incident-created",
            SecurityNotification::IncidentUpdated { .. } => "incident-updated",
            SecurityNotification::SourceBlocked { .. } => "ip-blocked",
            SecurityNotification::SubjectSuspended { .. } => "subject-suspended",
            SecurityNotification::StepUpRequired { .. } => "step-up-required",
            SecurityNotification::AlertRaised(_) => "security-alert",
        }
    }
}

/// Broadcast bus carrying [`SecurityNotification`]s to subscribers.
pub struct NotificationBus {
    sender: broadcast::Sender<SecurityNotification>,
    published: AtomicU64,
}

impl NotificationBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Publishes a notification, returning the number of receivers.
    ///
    /// Returns 0 when no subscriber is connected; that is not an error.
    pub fn publish(&self, notification: SecurityNotification) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = notification.topic();
        match self.sender.send(notification) {
            Ok(receivers) => {
                debug!(topic, receivers, "published notification");
                receivers
            }
            Err(_) => {
                debug!(topic, "published notification with no subscribers");
                0
            }
        }
    }

    /// Subscribes to all notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityNotification> {
        self.sender.subscribe()
    }

    /// Total notifications published since startup.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_stable() {
        let n = SecurityNotification::SourceBlocked {
            source_ip: "10.0.0.5".parse().unwrap(),
            duration_secs: 3600,
        };
        assert_eq!(n.topic(), "ip-blocked");

        let n = SecurityNotification::StepUpRequired {
            user_id: "u1".to_string(),
            duration_secs: 86400,
        };
        assert_eq!(n.topic(), "step-up-required");
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();

        let receivers = bus.publish(SecurityNotification::SubjectSuspended {
            user_id: "u1".to_string(),
            duration_secs: 60,
        });
        assert_eq!(receivers, 1);

        let got = rx.recv().await.unwrap();
        assert_eq!(got.topic(), "subject-suspended");
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = NotificationBus::default();
        let receivers = bus.publish(SecurityNotification::StepUpRequired {
            user_id: "u2".to_string(),
            duration_secs: 60,
        });
        assert_eq!(receivers, 0);
        assert_eq!(bus.published_count(), 1);
    }
}
