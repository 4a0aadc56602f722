//! # vg-rules
//!
//! Threat rule definitions (typed conditions and actions), the five
//! condition evaluators, and the cooldown-gated rule engine.

pub mod action;
pub mod condition;
pub mod engine;
pub mod eval;
pub mod rule;

pub use action::{
    ActionKind, AlertParams, BlockSourceParams, LogParams, RequireStepUpParams,
    SuspendSubjectParams, ThreatAction, WebhookParams,
};
pub use condition::{
    BehaviorAnomalyParams, FailedAuthBurstParams, GeoAnomalyParams, PatternKind,
    RateAnomalyParams, SuspiciousPatternParams, ThreatCondition,
};
pub use engine::RuleEngine;
pub use eval::{ConditionEvaluator, EvalError};
pub use rule::{builtin_rules, RuleError, ThreatRule};
