//! # vg-actions
//!
//! Automated response actions for Vigil. The [`executor::ActionExecutor`]
//! dispatches a triggered rule's actions in order; each action module
//! implements one mitigation or notification step.

pub mod alert;
pub mod block_source;
pub mod executor;
pub mod log_event;
pub mod require_step_up;
pub mod suspend_subject;
pub mod webhook;

pub use alert::AlertAction;
pub use block_source::BlockSourceAction;
pub use executor::{ActionContext, ActionError, ActionExecutor, DEFAULT_ACTION_TIMEOUT};
pub use log_event::LogEventAction;
pub use require_step_up::RequireStepUpAction;
pub use suspend_subject::SuspendSubjectAction;
pub use webhook::{WebhookAction, SIGNATURE_HEADER};
