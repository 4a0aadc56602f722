//! Log action. Emits a structured log entry; always succeeds.

use crate::executor::{ActionContext, ActionError};
use tracing::{info, instrument};
use vg_rules::LogParams;

/// Writes a structured detection log entry.
#[derive(Debug, Default)]
pub struct LogEventAction;

impl LogEventAction {
    /// Creates the action.
    pub fn new() -> Self {
        Self
    }

    /// Logs the trigger.
    #[instrument(skip(self, params, context))]
    pub async fn execute(
        &self,
        params: &LogParams,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        info!(
            rule_id = %context.rule_id,
            rule_name = %context.rule_name,
            incident_id = %context.incident_id,
            event_id = %context.event.id,
            category = context.event.category.as_str(),
            risk_score = context.event.risk_score,
            message = params.message.as_deref().unwrap_or("rule triggered"),
            "threat detection"
        );
        Ok("logged".to_string())
    }
}
