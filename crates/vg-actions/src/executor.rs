//! Action execution.
//!
//! Runs a triggered rule's actions in declaration order against the
//! triggering event. Each action honors its optional pre-execution
//! delay, is bounded by a timeout, and has its outcome captured as an
//! [`ExecutedAction`]. A failure never aborts the remaining actions.

use crate::alert::AlertAction;
use crate::block_source::BlockSourceAction;
use crate::log_event::LogEventAction;
use crate::require_step_up::RequireStepUpAction;
use crate::suspend_subject::SuspendSubjectAction;
use crate::webhook::WebhookAction;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;
use vg_core::alert::AlertLog;
use vg_core::bus::NotificationBus;
use vg_core::clock::SharedClock;
use vg_core::enforcement::EnforcementState;
use vg_core::event::SecurityEvent;
use vg_core::incident::{ActionOutcome, ExecutedAction};
use vg_core::store::StoreError;
use vg_rules::{ActionKind, ThreatRule};

/// Default per-action execution timeout.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur executing a single action.
#[derive(Error, Debug)]
pub enum ActionError {
    /// The action targets a subject but the event has none.
    #[error("Event has no subject to act on")]
    MissingSubject,

    /// The durable marker write failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The webhook call could not be made.
    #[error("Webhook request failed: {0}")]
    Http(String),

    /// The webhook endpoint answered with a non-success status.
    #[error("Webhook endpoint returned status {0}")]
    HttpStatus(u16),

    /// The action did not finish within the executor's timeout.
    #[error("Action timed out after {0} seconds")]
    Timeout(u64),
}

/// Context shared by every action of one trigger.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// The triggering event.
    pub event: SecurityEvent,
    /// The incident created for this trigger.
    pub incident_id: Uuid,
    /// Id of the triggered rule.
    pub rule_id: String,
    /// Name of the triggered rule.
    pub rule_name: String,
}

/// Executes response actions against engine state and the outside world.
pub struct ActionExecutor {
    block_source: BlockSourceAction,
    suspend_subject: SuspendSubjectAction,
    require_step_up: RequireStepUpAction,
    alert: AlertAction,
    log_event: LogEventAction,
    webhook: WebhookAction,
    clock: SharedClock,
    action_timeout: Duration,
}

impl ActionExecutor {
    /// Creates an executor over the engine's shared state.
    pub fn new(
        enforcement: Arc<EnforcementState>,
        alerts: Arc<AlertLog>,
        bus: Arc<NotificationBus>,
        clock: SharedClock,
        webhook_secret: Option<String>,
        webhook_timeout: Duration,
    ) -> Self {
        Self {
            block_source: BlockSourceAction::new(enforcement.clone(), bus.clone()),
            suspend_subject: SuspendSubjectAction::new(enforcement.clone(), bus.clone()),
            require_step_up: RequireStepUpAction::new(enforcement, bus.clone()),
            alert: AlertAction::new(alerts, bus, clock.clone()),
            log_event: LogEventAction::new(),
            webhook: WebhookAction::new(webhook_secret, webhook_timeout),
            clock,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Overrides the per-action timeout.
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Runs all of a rule's actions in order, returning their outcomes
    /// in the same order.
    #[instrument(skip(self, rule, event), fields(rule_id = %rule.id, incident_id = %incident_id))]
    pub async fn run(
        &self,
        rule: &ThreatRule,
        event: &SecurityEvent,
        incident_id: Uuid,
    ) -> Vec<ExecutedAction> {
        let context = ActionContext {
            event: event.clone(),
            incident_id,
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
        };

        let mut results = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            let delay = action.delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let outcome = self.execute_one(&action.kind, &context).await;
            let executed_at = self.clock.now();
            let executed = match outcome {
                Ok(detail) => ExecutedAction {
                    action: action.kind.name().to_string(),
                    executed_at,
                    outcome: ActionOutcome::Success,
                    detail,
                },
                Err(error @ ActionError::HttpStatus(_)) => {
                    warn!(action = action.kind.name(), %error, "action partially succeeded");
                    ExecutedAction {
                        action: action.kind.name().to_string(),
                        executed_at,
                        outcome: ActionOutcome::Partial,
                        detail: error.to_string(),
                    }
                }
                Err(error) => {
                    warn!(action = action.kind.name(), %error, "action failed");
                    ExecutedAction {
                        action: action.kind.name().to_string(),
                        executed_at,
                        outcome: ActionOutcome::Failed,
                        detail: error.to_string(),
                    }
                }
            };
            results.push(executed);
        }
        results
    }

    /// Dispatches one action by kind, bounded by the executor timeout.
    async fn execute_one(
        &self,
        kind: &ActionKind,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        let work = async {
            match kind {
                ActionKind::BlockSource(params) => {
                    self.block_source.execute(params, context).await
                }
                ActionKind::SuspendSubject(params) => {
                    self.suspend_subject.execute(params, context).await
                }
                ActionKind::RequireStepUp(params) => {
                    self.require_step_up.execute(params, context).await
                }
                ActionKind::Alert(params) => self.alert.execute(params, context).await,
                ActionKind::Log(params) => self.log_event.execute(params, context).await,
                ActionKind::Webhook(params) => self.webhook.execute(params, context).await,
            }
        };

        match tokio::time::timeout(self.action_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.action_timeout.as_secs())),
        }
    }
}
