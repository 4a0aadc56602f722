//! Incident management.
//!
//! Creates incidents atomically with rule triggers, appends action
//! outcomes and manual lifecycle transitions to their timelines, and
//! handles auto-resolution and retention. The in-memory map is a
//! read-through cache over the durable store; incident writes are
//! best-effort (a store failure is logged, never fatal to detection).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::clock::SharedClock;
use vg_core::event::SecurityEvent;
use vg_core::incident::{
    Actor, ExecutedAction, Incident, IncidentError, IncidentStatus,
};
use vg_core::store::Store;
use vg_observability::metrics as obs;
use vg_rules::ThreatRule;

/// Manages incident lifecycle and retention.
pub struct IncidentManager {
    store: Arc<dyn Store>,
    bus: Arc<NotificationBus>,
    clock: SharedClock,
    retention: Duration,
    incidents: RwLock<HashMap<Uuid, Incident>>,
}

impl IncidentManager {
    /// Creates a manager persisting incidents with the given retention.
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<NotificationBus>,
        clock: SharedClock,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            retention,
            incidents: RwLock::new(HashMap::new()),
        }
    }

    fn key(id: Uuid) -> String {
        format!("incident:{id}")
    }

    async fn persist(&self, incident: &Incident) {
        match serde_json::to_vec(incident) {
            Ok(bytes) => {
                if let Err(error) = self
                    .store
                    .set(&Self::key(incident.id), &bytes, self.retention)
                    .await
                {
                    warn!(incident_id = %incident.id, %error, "failed to persist incident");
                }
            }
            Err(error) => {
                warn!(incident_id = %incident.id, %error, "failed to encode incident");
            }
        }
    }

    /// Creates an incident for a rule trigger and announces it.
    #[instrument(skip(self, rule, event), fields(rule_id = %rule.id))]
    pub async fn create(&self, rule: &ThreatRule, event: &SecurityEvent) -> Uuid {
        let incident = Incident::from_trigger(
            &rule.id,
            &rule.name,
            rule.severity,
            event,
            self.clock.now(),
        );
        let id = incident.id;

        info!(incident_id = %id, rule_id = %rule.id, severity = rule.severity.as_str(), "incident created");
        obs::record_incident_created(rule.severity.as_str());

        self.persist(&incident).await;
        self.incidents.write().await.insert(id, incident);
        self.bus.publish(SecurityNotification::IncidentCreated {
            incident_id: id,
            rule_id: rule.id.clone(),
            severity: rule.severity,
        });
        id
    }

    /// Appends executed-action outcomes in order.
    pub async fn record_results(
        &self,
        incident_id: Uuid,
        results: Vec<ExecutedAction>,
    ) -> Result<(), IncidentError> {
        let mut incidents = self.incidents.write().await;
        let incident = incidents
            .get_mut(&incident_id)
            .ok_or(IncidentError::NotFound(incident_id))?;

        let now = self.clock.now();
        for executed in results {
            obs::record_action(&executed.action, executed.outcome.as_str());
            incident.record_action(executed, now);
        }
        let snapshot = incident.clone();
        drop(incidents);

        self.persist(&snapshot).await;
        self.bus.publish(SecurityNotification::IncidentUpdated {
            incident_id,
            status: snapshot.status,
        });
        Ok(())
    }

    async fn transition(
        &self,
        incident_id: Uuid,
        to: IncidentStatus,
        actor: Actor,
        note: Option<String>,
    ) -> Result<(), IncidentError> {
        let mut incidents = self.incidents.write().await;
        let incident = incidents
            .get_mut(&incident_id)
            .ok_or(IncidentError::NotFound(incident_id))?;
        incident.transition(to, actor, note, self.clock.now())?;
        let snapshot = incident.clone();
        drop(incidents);

        self.persist(&snapshot).await;
        self.bus.publish(SecurityNotification::IncidentUpdated {
            incident_id,
            status: to,
        });
        Ok(())
    }

    /// Moves an incident into manual investigation.
    pub async fn start_investigation(&self, incident_id: Uuid) -> Result<(), IncidentError> {
        self.transition(incident_id, IncidentStatus::Investigating, Actor::Admin, None)
            .await
    }

    /// Resolves an incident with a note.
    pub async fn resolve(
        &self,
        incident_id: Uuid,
        note: impl Into<String>,
    ) -> Result<(), IncidentError> {
        obs::record_incident_resolved(false);
        self.transition(
            incident_id,
            IncidentStatus::Resolved,
            Actor::Admin,
            Some(note.into()),
        )
        .await
    }

    /// Closes an incident as a false positive.
    pub async fn mark_false_positive(
        &self,
        incident_id: Uuid,
        note: impl Into<String>,
    ) -> Result<(), IncidentError> {
        obs::record_incident_resolved(false);
        self.transition(
            incident_id,
            IncidentStatus::FalsePositive,
            Actor::Admin,
            Some(note.into()),
        )
        .await
    }

    /// Auto-resolves active incidents older than `max_age`. Returns how
    /// many were closed.
    pub async fn auto_resolve_stale(&self, max_age: chrono::Duration) -> usize {
        let now = self.clock.now();
        let stale: Vec<Uuid> = {
            let incidents = self.incidents.read().await;
            incidents
                .values()
                .filter(|i| i.status == IncidentStatus::Active && i.age(now) > max_age)
                .map(|i| i.id)
                .collect()
        };

        let mut resolved = 0;
        for id in stale {
            let result = self
                .transition(
                    id,
                    IncidentStatus::Resolved,
                    Actor::System,
                    Some("Auto-resolved: no activity within the resolution window".to_string()),
                )
                .await;
            match result {
                Ok(()) => {
                    obs::record_incident_resolved(true);
                    info!(incident_id = %id, "incident auto-resolved");
                    resolved += 1;
                }
                Err(error) => {
                    warn!(incident_id = %id, %error, "auto-resolve failed");
                }
            }
        }
        resolved
    }

    /// Drops terminal incidents past the retention window from the
    /// in-memory map. Durable copies expire via their TTL.
    pub async fn purge_expired(&self, retention: chrono::Duration) -> usize {
        let now = self.clock.now();
        let mut incidents = self.incidents.write().await;
        let before = incidents.len();
        incidents.retain(|_, incident| {
            !(incident.status.is_terminal() && incident.age(now) > retention)
        });
        before - incidents.len()
    }

    /// Returns an incident by id.
    pub async fn get(&self, incident_id: Uuid) -> Option<Incident> {
        self.incidents.read().await.get(&incident_id).cloned()
    }

    /// Returns all non-terminal incidents, newest first.
    pub async fn list_active(&self) -> Vec<Incident> {
        let incidents = self.incidents.read().await;
        let mut active: Vec<Incident> = incidents
            .values()
            .filter(|i| !i.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    /// Total retained incidents.
    pub async fn total_count(&self) -> usize {
        self.incidents.read().await.len()
    }

    /// Non-terminal incident count.
    pub async fn active_count(&self) -> usize {
        let incidents = self.incidents.read().await;
        incidents.values().filter(|i| !i.status.is_terminal()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap as StdHashMap;
    use vg_core::clock::{Clock, ManualClock};
    use vg_core::event::{actions, EventCategory, Severity};
    use vg_core::incident::ActionOutcome;
    use vg_core::store::MemoryStore;
    use vg_rules::{ActionKind, LogParams, ThreatAction};

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, IncidentManager) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let bus = Arc::new(NotificationBus::default());
        let manager = IncidentManager::new(
            store.clone(),
            bus,
            clock.clone(),
            Duration::from_secs(30 * 86400),
        );
        (clock, store, manager)
    }

    fn rule() -> ThreatRule {
        ThreatRule::new("r1", "Rule one", Severity::High)
            .with_condition(vg_rules::ThreatCondition::BehaviorAnomaly(
                vg_rules::BehaviorAnomalyParams { threshold: 50 },
            ))
            .with_action(ThreatAction::new(ActionKind::Log(LogParams::default())))
    }

    fn event(at: chrono::DateTime<Utc>) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: at,
            category: EventCategory::Authentication,
            action: actions::LOGIN_FAILED.to_string(),
            user_id: Some("u1".to_string()),
            source_ip: "10.0.0.5".parse().unwrap(),
            user_agent: String::new(),
            location: None,
            severity: Severity::High,
            details: StdHashMap::new(),
            risk_score: 60,
            resolved: false,
            response_actions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_persists_and_lists_active() {
        let (clock, store, manager) = setup();
        let id = manager.create(&rule(), &event(clock.now())).await;

        assert_eq!(manager.active_count().await, 1);
        assert_eq!(manager.list_active().await[0].id, id);
        assert!(store
            .exists(&format!("incident:{id}"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn record_results_appends_and_reports_missing() {
        let (clock, _store, manager) = setup();
        let id = manager.create(&rule(), &event(clock.now())).await;

        manager
            .record_results(
                id,
                vec![ExecutedAction {
                    action: "log".to_string(),
                    executed_at: clock.now(),
                    outcome: ActionOutcome::Success,
                    detail: "logged".to_string(),
                }],
            )
            .await
            .unwrap();

        let incident = manager.get(id).await.unwrap();
        assert_eq!(incident.executed_actions.len(), 1);

        let missing = manager.record_results(Uuid::new_v4(), Vec::new()).await;
        assert!(matches!(missing, Err(IncidentError::NotFound(_))));
    }

    #[tokio::test]
    async fn stale_active_incidents_auto_resolve() {
        let (clock, _store, manager) = setup();
        let id = manager.create(&rule(), &event(clock.now())).await;

        // Under investigation incidents also age, but only Active ones
        // auto-resolve.
        let other = manager.create(&rule(), &event(clock.now())).await;
        manager.start_investigation(other).await.unwrap();

        clock.advance(chrono::Duration::hours(25));
        let resolved = manager.auto_resolve_stale(chrono::Duration::hours(24)).await;
        assert_eq!(resolved, 1);

        let incident = manager.get(id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert!(incident
            .resolution_note
            .as_deref()
            .unwrap()
            .starts_with("Auto-resolved"));

        assert_eq!(
            manager.get(other).await.unwrap().status,
            IncidentStatus::Investigating
        );
    }

    #[tokio::test]
    async fn purge_drops_only_old_terminal_incidents() {
        let (clock, _store, manager) = setup();
        let resolved_id = manager.create(&rule(), &event(clock.now())).await;
        manager.resolve(resolved_id, "done").await.unwrap();
        let active_id = manager.create(&rule(), &event(clock.now())).await;

        clock.advance(chrono::Duration::days(31));
        let purged = manager.purge_expired(chrono::Duration::days(30)).await;
        assert_eq!(purged, 1);
        assert!(manager.get(resolved_id).await.is_none());
        assert!(manager.get(active_id).await.is_some());
    }

    #[tokio::test]
    async fn manual_lifecycle_flow() {
        let (clock, _store, manager) = setup();
        let id = manager.create(&rule(), &event(clock.now())).await;

        manager.start_investigation(id).await.unwrap();
        manager.mark_false_positive(id, "benign batch job").await.unwrap();

        let incident = manager.get(id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::FalsePositive);
        assert_eq!(incident.resolution_note.as_deref(), Some("benign batch job"));

        // Terminal: further transitions fail.
        assert!(manager.start_investigation(id).await.is_err());
    }
}
