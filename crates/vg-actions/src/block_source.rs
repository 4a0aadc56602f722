//! Block-source action.
//!
//! Writes a TTL-bounded block marker for the event's source address and
//! announces it on the bus.

use crate::executor::{ActionContext, ActionError};
use std::sync::Arc;
use tracing::{info, instrument};
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::enforcement::EnforcementState;
use vg_rules::BlockSourceParams;

/// Blocks the triggering event's source address.
pub struct BlockSourceAction {
    enforcement: Arc<EnforcementState>,
    bus: Arc<NotificationBus>,
}

impl BlockSourceAction {
    /// Creates the action over shared enforcement state.
    pub fn new(enforcement: Arc<EnforcementState>, bus: Arc<NotificationBus>) -> Self {
        Self { enforcement, bus }
    }

    /// Applies the block marker.
    #[instrument(skip(self, params, context), fields(rule_id = %context.rule_id))]
    pub async fn execute(
        &self,
        params: &BlockSourceParams,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        let ip = context.event.source_ip;
        self.enforcement.block_source(ip, params.duration()).await?;
        self.bus.publish(SecurityNotification::SourceBlocked {
            source_ip: ip,
            duration_secs: params.duration_secs,
        });
        info!(%ip, duration_secs = params.duration_secs, "blocked source address");
        Ok(format!("blocked {ip} for {}s", params.duration_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;
    use vg_core::event::{EventCategory, SecurityEvent, Severity};
    use vg_core::store::MemoryStore;

    #[tokio::test]
    async fn block_marks_address_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let enforcement = Arc::new(EnforcementState::new(store));
        let bus = Arc::new(NotificationBus::default());
        let mut rx = bus.subscribe();

        let action = BlockSourceAction::new(enforcement.clone(), bus);
        let context = ActionContext {
            event: SecurityEvent {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                category: EventCategory::Authentication,
                action: "login_failed".to_string(),
                user_id: Some("u1".to_string()),
                source_ip: "10.0.0.5".parse().unwrap(),
                user_agent: String::new(),
                location: None,
                severity: Severity::High,
                details: HashMap::new(),
                risk_score: 60,
                resolved: false,
                response_actions: Vec::new(),
            },
            incident_id: Uuid::new_v4(),
            rule_id: "failed_auth_burst".to_string(),
            rule_name: "Failed auth burst".to_string(),
        };

        let detail = action
            .execute(&BlockSourceParams { duration_secs: 3600 }, &context)
            .await
            .unwrap();
        assert!(detail.contains("10.0.0.5"));
        assert!(enforcement.is_source_blocked(&context.event.source_ip).await);

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.topic(), "ip-blocked");
    }
}
