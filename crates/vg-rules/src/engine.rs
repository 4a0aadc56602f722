//! The threat rule engine.
//!
//! Evaluates every enabled rule against each recorded event, in
//! declaration order, behind a per-rule cooldown gate. A rule triggers
//! when all of its conditions hold; evaluation errors inside one rule
//! are logged and confined to that rule.
//!
//! Cooldown markers live in the durable store (`cooldown:{rule_id}`)
//! with the rule's cooldown as TTL, so replicas share the gate.

use crate::eval::ConditionEvaluator;
use crate::rule::{RuleError, ThreatRule};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use vg_core::event::SecurityEvent;
use vg_core::store::Store;

/// Holds rule definitions and evaluates them against events.
pub struct RuleEngine {
    rules: RwLock<Vec<ThreatRule>>,
    evaluator: ConditionEvaluator,
    store: Arc<dyn Store>,
}

impl RuleEngine {
    /// Creates an engine with the given rule set.
    ///
    /// Rules are validated; the first invalid rule aborts construction.
    pub fn new(
        rules: Vec<ThreatRule>,
        evaluator: ConditionEvaluator,
        store: Arc<dyn Store>,
    ) -> Result<Self, RuleError> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self {
            rules: RwLock::new(rules),
            evaluator,
            store,
        })
    }

    fn cooldown_key(rule_id: &str) -> String {
        format!("cooldown:{rule_id}")
    }

    /// Evaluates all enabled rules against an event, returning the rules
    /// that triggered. Starting a rule's cooldown happens here, at
    /// trigger time.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn evaluate_event(&self, event: &SecurityEvent) -> Vec<ThreatRule> {
        let rules = self.rules.read().await.clone();
        let mut triggered = Vec::new();

        for rule in rules.into_iter().filter(|r| r.enabled) {
            // Cooldown gate. A store failure here fails open: losing a
            // detection is worse than a duplicate incident.
            match self.store.exists(&Self::cooldown_key(&rule.id)).await {
                Ok(true) => {
                    debug!(rule_id = %rule.id, "rule in cooldown, skipped");
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(rule_id = %rule.id, %error, "cooldown check failed, evaluating anyway");
                }
            }

            if self.conditions_hold(&rule, event).await {
                if let Err(error) = self
                    .store
                    .set(&Self::cooldown_key(&rule.id), b"1", rule.cooldown())
                    .await
                {
                    warn!(rule_id = %rule.id, %error, "failed to record cooldown marker");
                }
                info!(rule_id = %rule.id, event_id = %event.id, "rule triggered");
                triggered.push(rule);
            }
        }

        triggered
    }

    /// AND-evaluates a rule's conditions, short-circuiting on the first
    /// miss. Evaluation errors count as a miss for this rule only.
    async fn conditions_hold(&self, rule: &ThreatRule, event: &SecurityEvent) -> bool {
        for condition in &rule.conditions {
            match self.evaluator.evaluate(&rule.id, condition, event).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(error) => {
                    warn!(
                        rule_id = %rule.id,
                        kind = condition.kind(),
                        %error,
                        "condition evaluation failed, treating rule as not triggered"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Adds a rule or replaces the rule with the same id.
    pub async fn upsert_rule(&self, rule: ThreatRule) -> Result<(), RuleError> {
        rule.validate()?;
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        Ok(())
    }

    /// Removes a rule by id.
    pub async fn remove_rule(&self, rule_id: &str) -> Result<(), RuleError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        if rules.len() == before {
            return Err(RuleError::NotFound(rule_id.to_string()));
        }
        Ok(())
    }

    /// Enables or disables a rule.
    pub async fn set_enabled(&self, rule_id: &str, enabled: bool) -> Result<(), RuleError> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                Ok(())
            }
            None => Err(RuleError::NotFound(rule_id.to_string())),
        }
    }

    /// Snapshot of the current rule set.
    pub async fn rules(&self) -> Vec<ThreatRule> {
        self.rules.read().await.clone()
    }

    /// Number of configured rules.
    pub async fn rule_count(&self) -> usize {
        self.rules.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, LogParams, ThreatAction};
    use crate::condition::{FailedAuthBurstParams, ThreatCondition};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;
    use vg_core::clock::{Clock, ManualClock};
    use vg_core::event::{actions, EventCategory, Severity};
    use vg_core::profile::ProfileStore;
    use vg_core::recent::RecentEvents;
    use vg_core::store::MemoryStore;

    fn burst_rule(threshold: u32, cooldown_secs: u64) -> ThreatRule {
        ThreatRule::new("burst", "Burst", Severity::High)
            .with_condition(ThreatCondition::FailedAuthBurst(FailedAuthBurstParams {
                threshold,
                window_secs: 300,
                check_user_and_ip: true,
            }))
            .with_action(ThreatAction::new(ActionKind::Log(LogParams::default())))
            .with_cooldown(Duration::from_secs(cooldown_secs))
    }

    fn failed_login(user: &str, at: chrono::DateTime<Utc>) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: at,
            category: EventCategory::Authentication,
            action: actions::LOGIN_FAILED.to_string(),
            user_id: Some(user.to_string()),
            source_ip: "10.0.0.5".parse().unwrap(),
            user_agent: String::new(),
            location: None,
            severity: Severity::Medium,
            details: HashMap::new(),
            risk_score: 30,
            resolved: false,
            response_actions: Vec::new(),
        }
    }

    fn engine_with(
        rules: Vec<ThreatRule>,
    ) -> (Arc<ManualClock>, RuleEngine) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let profiles = Arc::new(ProfileStore::new(store.clone(), clock.clone()));
        let recent = Arc::new(RecentEvents::default());
        let evaluator =
            ConditionEvaluator::new(store.clone(), profiles, recent, clock.clone());
        let engine = RuleEngine::new(rules, evaluator, store).unwrap();
        (clock, engine)
    }

    #[tokio::test]
    async fn rule_triggers_once_then_cooldown_suppresses() {
        let (clock, engine) = engine_with(vec![burst_rule(3, 600)]);

        let mut triggers = 0;
        for _ in 0..6 {
            let event = failed_login("u1", clock.now());
            triggers += engine.evaluate_event(&event).await.len();
        }
        // Third failure triggers; the rest sit inside the cooldown.
        assert_eq!(triggers, 1);
    }

    #[tokio::test]
    async fn cooldown_expiry_rearms_the_rule() {
        let (clock, engine) = engine_with(vec![burst_rule(1, 600)]);

        let event = failed_login("u1", clock.now());
        assert_eq!(engine.evaluate_event(&event).await.len(), 1);
        assert_eq!(engine.evaluate_event(&event).await.len(), 0);

        clock.advance(chrono::Duration::seconds(601));
        let event = failed_login("u1", clock.now());
        assert_eq!(engine.evaluate_event(&event).await.len(), 1);
    }

    #[tokio::test]
    async fn cooldown_is_shared_across_subjects() {
        // Keyed by rule id alone: u1's trigger suppresses u2's.
        let (clock, engine) = engine_with(vec![burst_rule(1, 600)]);

        let event = failed_login("u1", clock.now());
        assert_eq!(engine.evaluate_event(&event).await.len(), 1);

        let event = failed_login("u2", clock.now());
        assert_eq!(engine.evaluate_event(&event).await.len(), 0);
    }

    #[tokio::test]
    async fn disabled_rules_are_skipped() {
        let (clock, engine) = engine_with(vec![burst_rule(1, 600)]);
        engine.set_enabled("burst", false).await.unwrap();

        let event = failed_login("u1", clock.now());
        assert!(engine.evaluate_event(&event).await.is_empty());

        engine.set_enabled("burst", true).await.unwrap();
        let event = failed_login("u1", clock.now());
        assert_eq!(engine.evaluate_event(&event).await.len(), 1);
    }

    #[tokio::test]
    async fn runtime_rule_management() {
        let (_clock, engine) = engine_with(vec![burst_rule(1, 600)]);
        assert_eq!(engine.rule_count().await, 1);

        let mut replacement = burst_rule(2, 600);
        replacement.name = "Burst v2".to_string();
        engine.upsert_rule(replacement).await.unwrap();
        assert_eq!(engine.rule_count().await, 1);
        assert_eq!(engine.rules().await[0].name, "Burst v2");

        engine.remove_rule("burst").await.unwrap();
        assert_eq!(engine.rule_count().await, 0);
        assert!(matches!(
            engine.remove_rule("burst").await,
            Err(RuleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_rules_are_rejected_at_load() {
        let invalid = ThreatRule::new("empty", "Empty", Severity::Low);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let profiles = Arc::new(ProfileStore::new(store.clone(), clock.clone()));
        let recent = Arc::new(RecentEvents::default());
        let evaluator = ConditionEvaluator::new(store.clone(), profiles, recent, clock);
        assert!(RuleEngine::new(vec![invalid], evaluator, store).is_err());
    }
}
