//! Suspend-subject action.

use crate::executor::{ActionContext, ActionError};
use std::sync::Arc;
use tracing::{info, instrument};
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::enforcement::EnforcementState;
use vg_rules::SuspendSubjectParams;

/// Suspends the triggering event's subject for a bounded duration.
pub struct SuspendSubjectAction {
    enforcement: Arc<EnforcementState>,
    bus: Arc<NotificationBus>,
}

impl SuspendSubjectAction {
    /// Creates the action over shared enforcement state.
    pub fn new(enforcement: Arc<EnforcementState>, bus: Arc<NotificationBus>) -> Self {
        Self { enforcement, bus }
    }

    /// Applies the suspension marker. Fails when the event carries no
    /// subject.
    #[instrument(skip(self, params, context), fields(rule_id = %context.rule_id))]
    pub async fn execute(
        &self,
        params: &SuspendSubjectParams,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        let user_id = context
            .event
            .user_id
            .as_deref()
            .ok_or(ActionError::MissingSubject)?;

        self.enforcement
            .suspend_subject(user_id, params.duration())
            .await?;
        self.bus.publish(SecurityNotification::SubjectSuspended {
            user_id: user_id.to_string(),
            duration_secs: params.duration_secs,
        });
        info!(user_id, duration_secs = params.duration_secs, "suspended subject");
        Ok(format!("suspended {user_id} for {}s", params.duration_secs))
    }
}
