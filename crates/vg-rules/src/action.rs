//! Threat action definitions.
//!
//! Actions are configuration data on a rule: a kind with typed
//! parameters plus an optional pre-execution delay. Execution lives in
//! `vg-actions`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vg_core::event::Severity;

/// One automated mitigation or notification step on a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAction {
    /// What to do.
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Seconds to wait before executing.
    #[serde(default)]
    pub delay_secs: u64,
}

impl ThreatAction {
    /// Creates an action with no delay.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            delay_secs: 0,
        }
    }

    /// Sets the pre-execution delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_secs = delay.as_secs();
        self
    }

    /// Pre-execution delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Validates the action's parameters.
    pub fn validate(&self) -> Result<(), String> {
        match &self.kind {
            ActionKind::Alert(p) => {
                if p.message.is_empty() {
                    return Err("alert message must not be empty".to_string());
                }
            }
            ActionKind::BlockSource(p) => {
                if p.duration_secs == 0 {
                    return Err("block_source duration must be positive".to_string());
                }
            }
            ActionKind::SuspendSubject(p) => {
                if p.duration_secs == 0 {
                    return Err("suspend_subject duration must be positive".to_string());
                }
            }
            ActionKind::RequireStepUp(p) => {
                if p.duration_secs == 0 {
                    return Err("require_step_up duration must be positive".to_string());
                }
            }
            ActionKind::Log(_) => {}
            ActionKind::Webhook(p) => {
                if !p.url.starts_with("http://") && !p.url.starts_with("https://") {
                    return Err(format!("webhook url must be http(s), got '{}'", p.url));
                }
            }
        }
        Ok(())
    }
}

/// Action kinds with their typed parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Raise an alert on the internal bus and alert log.
    Alert(AlertParams),
    /// Block the event's source address.
    BlockSource(BlockSourceParams),
    /// Suspend the event's subject.
    SuspendSubject(SuspendSubjectParams),
    /// Require step-up authentication from the event's subject.
    RequireStepUp(RequireStepUpParams),
    /// Write a structured log entry. Always succeeds.
    Log(LogParams),
    /// POST a JSON payload to a configured endpoint.
    Webhook(WebhookParams),
}

impl ActionKind {
    /// Stable kind name used in incident records and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Alert(_) => "alert",
            ActionKind::BlockSource(_) => "block_source",
            ActionKind::SuspendSubject(_) => "suspend_subject",
            ActionKind::RequireStepUp(_) => "require_step_up",
            ActionKind::Log(_) => "log",
            ActionKind::Webhook(_) => "webhook",
        }
    }
}

/// Parameters for the alert action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertParams {
    /// Severity of the raised alert.
    pub severity: Severity,
    /// Alert message.
    pub message: String,
}

/// Parameters for the block-source action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSourceParams {
    /// Block duration, seconds.
    pub duration_secs: u64,
}

impl BlockSourceParams {
    /// Block duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Parameters for the suspend-subject action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendSubjectParams {
    /// Suspension duration, seconds.
    pub duration_secs: u64,
}

impl SuspendSubjectParams {
    /// Suspension duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Parameters for the require-step-up action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequireStepUpParams {
    /// How long the step-up requirement stays in force, seconds.
    pub duration_secs: u64,
}

impl RequireStepUpParams {
    /// Requirement duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Parameters for the log action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogParams {
    /// Optional message included in the log entry.
    #[serde(default)]
    pub message: Option<String>,
}

/// Parameters for the webhook action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookParams {
    /// Endpoint to POST to.
    pub url: String,
    /// Include the full triggering event in the payload.
    #[serde(default = "default_true")]
    pub include_event: bool,
}

fn default_true() -> bool {
    true
}
