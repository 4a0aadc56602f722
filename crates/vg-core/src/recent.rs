//! Bounded in-memory window of recently recorded events.
//!
//! The recorder pushes every materialized event here; the
//! suspicious-pattern evaluator scans it, and the retention sweep prunes
//! it. Most-recent-first, capped, oldest evicted.

use crate::event::SecurityEvent;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Default capacity of the recent-events window.
pub const DEFAULT_RECENT_EVENTS_CAP: usize = 1000;

/// Bounded most-recent-first buffer of [`SecurityEvent`]s.
pub struct RecentEvents {
    events: RwLock<VecDeque<SecurityEvent>>,
    cap: usize,
}

impl RecentEvents {
    /// Creates a buffer with the given capacity.
    pub fn new(cap: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(cap.min(64))),
            cap,
        }
    }

    /// Appends an event, evicting the oldest past capacity.
    pub async fn push(&self, event: SecurityEvent) {
        let mut events = self.events.write().await;
        events.push_front(event);
        events.truncate(self.cap);
    }

    /// Events for a subject recorded within `window` of `now`.
    pub async fn for_user_within(
        &self,
        user_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Vec<SecurityEvent> {
        let cutoff = now - window;
        let events = self.events.read().await;
        events
            .iter()
            .take_while(|e| e.timestamp >= cutoff)
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect()
    }

    /// Drops events older than the cutoff. Returns how many were removed.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        before - events.len()
    }

    /// Number of retained events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the buffer is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_EVENTS_CAP)
    }
}
