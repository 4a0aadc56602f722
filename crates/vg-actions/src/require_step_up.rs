//! Require-step-up action.

use crate::executor::{ActionContext, ActionError};
use std::sync::Arc;
use tracing::{info, instrument};
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::enforcement::EnforcementState;
use vg_rules::RequireStepUpParams;

/// Requires step-up authentication from the triggering event's subject.
pub struct RequireStepUpAction {
    enforcement: Arc<EnforcementState>,
    bus: Arc<NotificationBus>,
}

impl RequireStepUpAction {
    /// Creates the action over shared enforcement state.
    pub fn new(enforcement: Arc<EnforcementState>, bus: Arc<NotificationBus>) -> Self {
        Self { enforcement, bus }
    }

    /// Applies the step-up marker. Fails when the event carries no
    /// subject.
    #[instrument(skip(self, params, context), fields(rule_id = %context.rule_id))]
    pub async fn execute(
        &self,
        params: &RequireStepUpParams,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        let user_id = context
            .event
            .user_id
            .as_deref()
            .ok_or(ActionError::MissingSubject)?;

        self.enforcement
            .require_step_up(user_id, params.duration())
            .await?;
        self.bus.publish(SecurityNotification::StepUpRequired {
            user_id: user_id.to_string(),
            duration_secs: params.duration_secs,
        });
        info!(user_id, duration_secs = params.duration_secs, "step-up authentication required");
        Ok(format!(
            "step-up required from {user_id} for {}s",
            params.duration_secs
        ))
    }
}
