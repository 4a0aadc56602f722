//! Alert action.
//!
//! Appends to the bounded alert log and announces the alert on the bus
//! for the alerting UI and compliance consumers.

use crate::executor::{ActionContext, ActionError};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;
use vg_core::alert::{AlertLog, SecurityAlert};
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::clock::SharedClock;
use vg_rules::AlertParams;

/// Raises a security alert.
pub struct AlertAction {
    alerts: Arc<AlertLog>,
    bus: Arc<NotificationBus>,
    clock: SharedClock,
}

impl AlertAction {
    /// Creates the action over the shared alert log.
    pub fn new(alerts: Arc<AlertLog>, bus: Arc<NotificationBus>, clock: SharedClock) -> Self {
        Self { alerts, bus, clock }
    }

    /// Records and publishes the alert.
    #[instrument(skip(self, params, context), fields(rule_id = %context.rule_id))]
    pub async fn execute(
        &self,
        params: &AlertParams,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        let alert = SecurityAlert {
            id: Uuid::new_v4(),
            severity: params.severity,
            message: params.message.clone(),
            rule_id: context.rule_id.clone(),
            event_id: Some(context.event.id),
            incident_id: Some(context.incident_id),
            timestamp: self.clock.now(),
        };

        warn!(
            severity = params.severity.as_str(),
            rule_id = %context.rule_id,
            message = %params.message,
            "security alert raised"
        );

        self.alerts.push(alert.clone()).await;
        self.bus.publish(SecurityNotification::AlertRaised(alert));
        Ok(format!("alert raised: {}", params.message))
    }
}
