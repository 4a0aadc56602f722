//! Incident records and the incident status state machine.
//!
//! An incident is created atomically with a rule trigger and always
//! carries at least one timeline entry (the triggering detection).
//! Status moves `Active → Investigating → Resolved | FalsePositive`;
//! the two terminal states are absorbing.

use crate::event::{SecurityEvent, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur operating on incidents.
#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: IncidentStatus,
        to: IncidentStatus,
    },

    #[error("Incident not found: {0}")]
    NotFound(Uuid),
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Newly created, awaiting triage.
    Active,
    /// Under manual investigation.
    Investigating,
    /// Closed as a real, handled incident.
    Resolved,
    /// Closed as a false positive.
    FalsePositive,
}

impl IncidentStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::FalsePositive)
    }

    /// Whether a transition to `to` is legal.
    pub fn can_transition_to(&self, to: IncidentStatus) -> bool {
        match (*self, to) {
            (IncidentStatus::Active, IncidentStatus::Investigating)
            | (IncidentStatus::Active, IncidentStatus::Resolved)
            | (IncidentStatus::Active, IncidentStatus::FalsePositive)
            | (IncidentStatus::Investigating, IncidentStatus::Resolved)
            | (IncidentStatus::Investigating, IncidentStatus::FalsePositive) => true,
            _ => false,
        }
    }
}

/// Outcome of one executed response action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failed,
    Partial,
}

impl ActionOutcome {
    /// Stable string form used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Success => "success",
            ActionOutcome::Failed => "failed",
            ActionOutcome::Partial => "partial",
        }
    }
}

/// Record of one attempted response action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedAction {
    /// Action kind identifier, e.g. `block_source`.
    pub action: String,
    /// When the action was executed.
    pub executed_at: DateTime<Utc>,
    /// How the execution ended.
    pub outcome: ActionOutcome,
    /// Free-text detail (success message or failure reason).
    pub detail: String,
}

/// Kind of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Detection,
    Escalation,
    Action,
    Resolution,
}

/// Who caused a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Admin,
    User,
}

/// One entry in an incident's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Entry kind.
    pub kind: TimelineKind,
    /// Human-readable description.
    pub description: String,
    /// Who caused the entry.
    pub actor: Actor,
    /// Structured details.
    pub details: HashMap<String, serde_json::Value>,
}

/// The record of one rule trigger and its handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier.
    pub id: Uuid,
    /// Rule whose trigger created this incident.
    pub rule_id: String,
    /// Severity inherited from the rule.
    pub severity: Severity,
    /// Current lifecycle status.
    pub status: IncidentStatus,
    /// Outcomes of executed actions, in declaration order.
    pub executed_actions: Vec<ExecutedAction>,
    /// Ordered timeline.
    pub timeline: Vec<TimelineEntry>,
    /// Subjects affected by the triggering event.
    pub affected_users: Vec<String>,
    /// Resources affected (source addresses, endpoints).
    pub affected_resources: Vec<String>,
    /// Free-text resolution note.
    pub resolution_note: Option<String>,
    /// When the incident was created.
    pub created_at: DateTime<Utc>,
    /// When the incident entered a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Creates an incident for a rule trigger, seeded with the detection
    /// timeline entry.
    pub fn from_trigger(
        rule_id: &str,
        rule_name: &str,
        severity: Severity,
        event: &SecurityEvent,
        now: DateTime<Utc>,
    ) -> Self {
        let mut details = HashMap::new();
        details.insert("event_id".to_string(), serde_json::json!(event.id));
        details.insert("rule_id".to_string(), serde_json::json!(rule_id));
        details.insert(
            "risk_score".to_string(),
            serde_json::json!(event.risk_score),
        );

        let detection = TimelineEntry {
            timestamp: now,
            kind: TimelineKind::Detection,
            description: format!("Rule '{rule_name}' triggered by event {}", event.id),
            actor: Actor::System,
            details,
        };

        Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            severity,
            status: IncidentStatus::Active,
            executed_actions: Vec::new(),
            timeline: vec![detection],
            affected_users: event.user_id.iter().cloned().collect(),
            affected_resources: vec![event.source_ip.to_string()],
            resolution_note: None,
            created_at: now,
            resolved_at: None,
        }
    }

    /// Appends an executed-action outcome and its timeline entry.
    pub fn record_action(&mut self, executed: ExecutedAction, now: DateTime<Utc>) {
        let mut details = HashMap::new();
        details.insert("action".to_string(), serde_json::json!(executed.action));
        details.insert(
            "outcome".to_string(),
            serde_json::json!(executed.outcome.as_str()),
        );

        self.timeline.push(TimelineEntry {
            timestamp: now,
            kind: TimelineKind::Action,
            description: format!(
                "Action '{}' finished: {} ({})",
                executed.action,
                executed.outcome.as_str(),
                executed.detail
            ),
            actor: Actor::System,
            details,
        });
        self.executed_actions.push(executed);
    }

    /// Transitions the incident to a new status.
    ///
    /// Terminal transitions record the resolution timestamp, note, and a
    /// `resolution` timeline entry.
    pub fn transition(
        &mut self,
        to: IncidentStatus,
        actor: Actor,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), IncidentError> {
        if !self.status.can_transition_to(to) {
            return Err(IncidentError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        if to.is_terminal() {
            self.resolved_at = Some(now);
            self.resolution_note = note.clone();
            self.timeline.push(TimelineEntry {
                timestamp: now,
                kind: TimelineKind::Resolution,
                description: note.unwrap_or_else(|| format!("Closed as {to:?}")),
                actor,
                details: HashMap::new(),
            });
        } else {
            self.timeline.push(TimelineEntry {
                timestamp: now,
                kind: TimelineKind::Escalation,
                description: "Investigation started".to_string(),
                actor,
                details: HashMap::new(),
            });
        }
        Ok(())
    }

    /// Age of the incident at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{actions, EventCategory, NewEvent};

    fn sample_event() -> SecurityEvent {
        let new = NewEvent::new(
            EventCategory::Authentication,
            actions::LOGIN_FAILED,
            "10.0.0.5".parse().unwrap(),
        )
        .with_user("u1");
        SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category: new.category,
            action: new.action,
            user_id: new.user_id,
            source_ip: new.source_ip,
            user_agent: new.user_agent,
            location: None,
            severity: Severity::High,
            details: new.details,
            risk_score: 70,
            resolved: false,
            response_actions: Vec::new(),
        }
    }

    #[test]
    fn creation_seeds_detection_entry() {
        let event = sample_event();
        let incident =
            Incident::from_trigger("failed_auth_burst", "Failed auth burst", Severity::High, &event, Utc::now());
        assert_eq!(incident.status, IncidentStatus::Active);
        assert_eq!(incident.timeline.len(), 1);
        assert_eq!(incident.timeline[0].kind, TimelineKind::Detection);
        assert_eq!(incident.affected_users, vec!["u1".to_string()]);
        assert_eq!(incident.affected_resources, vec!["10.0.0.5".to_string()]);
    }

    #[test]
    fn action_outcomes_append_in_order() {
        let event = sample_event();
        let mut incident =
            Incident::from_trigger("r", "r", Severity::High, &event, Utc::now());
        for name in ["block_source", "alert"] {
            incident.record_action(
                ExecutedAction {
                    action: name.to_string(),
                    executed_at: Utc::now(),
                    outcome: ActionOutcome::Success,
                    detail: String::new(),
                },
                Utc::now(),
            );
        }
        let order: Vec<&str> = incident
            .executed_actions
            .iter()
            .map(|a| a.action.as_str())
            .collect();
        assert_eq!(order, vec!["block_source", "alert"]);
        // Detection + two action entries.
        assert_eq!(incident.timeline.len(), 3);
    }

    #[test]
    fn legal_transitions() {
        let event = sample_event();
        let mut incident = Incident::from_trigger("r", "r", Severity::Low, &event, Utc::now());

        incident
            .transition(IncidentStatus::Investigating, Actor::Admin, None, Utc::now())
            .unwrap();
        incident
            .transition(
                IncidentStatus::Resolved,
                Actor::Admin,
                Some("handled".to_string()),
                Utc::now(),
            )
            .unwrap();

        assert!(incident.status.is_terminal());
        assert!(incident.resolved_at.is_some());
        assert_eq!(incident.resolution_note.as_deref(), Some("handled"));
        assert_eq!(
            incident.timeline.last().unwrap().kind,
            TimelineKind::Resolution
        );
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let event = sample_event();
        let mut incident = Incident::from_trigger("r", "r", Severity::Low, &event, Utc::now());
        incident
            .transition(IncidentStatus::FalsePositive, Actor::Admin, None, Utc::now())
            .unwrap();

        let err = incident.transition(IncidentStatus::Active, Actor::Admin, None, Utc::now());
        assert!(matches!(
            err,
            Err(IncidentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn investigating_cannot_go_back_to_active() {
        assert!(!IncidentStatus::Investigating.can_transition_to(IncidentStatus::Active));
        assert!(IncidentStatus::Investigating.can_transition_to(IncidentStatus::FalsePositive));
    }
}
