//! # vg-engine
//!
//! The Vigil threat detection and incident response engine: event
//! recording and risk scoring, rule evaluation over sliding windows and
//! behavioral baselines, automated response execution, incident
//! lifecycle tracking, and background maintenance.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use vg_core::{MemoryStore, NewEvent, EventCategory, StaticGeoResolver};
//! use vg_engine::{EngineConfig, SecurityEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SecurityEngine::new(
//!         EngineConfig::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(StaticGeoResolver::new()),
//!     )?;
//!     let sweeper = engine.start_sweeper();
//!
//!     let event = engine
//!         .record_event(NewEvent::new(
//!             EventCategory::Authentication,
//!             "login_failed",
//!             "203.0.113.9".parse()?,
//!         ))
//!         .await?;
//!     println!("risk score: {}", event.risk_score);
//!
//!     sweeper.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod incidents;
pub mod metrics;
pub mod recorder;
pub mod risk;
pub mod sweeper;

pub use config::{load_rules_file, merge_rules, ConfigError, EngineConfig, SweeperConfig};
pub use incidents::IncidentManager;
pub use metrics::EngineMetrics;
pub use recorder::{EngineError, EventRecorder};
pub use sweeper::{Sweeper, SweeperHandle};

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;
use vg_actions::ActionExecutor;
use vg_core::alert::AlertLog;
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::clock::{SharedClock, SystemClock};
use vg_core::enforcement::EnforcementState;
use vg_core::event::{NewEvent, SecurityEvent};
use vg_core::geo::GeoResolver;
use vg_core::incident::Incident;
use vg_core::profile::ProfileStore;
use vg_core::recent::RecentEvents;
use vg_core::store::Store;
use vg_rules::{builtin_rules, ConditionEvaluator, RuleEngine, ThreatRule};

/// Facade wiring all engine components.
///
/// Construction validates the rule set; the engine is then driven
/// entirely through [`SecurityEngine::record_event`], the query
/// methods, and the sweeper handle.
pub struct SecurityEngine {
    recorder: EventRecorder,
    rules: Arc<RuleEngine>,
    incidents: Arc<IncidentManager>,
    enforcement: Arc<EnforcementState>,
    alerts: Arc<AlertLog>,
    recent: Arc<RecentEvents>,
    bus: Arc<NotificationBus>,
    clock: SharedClock,
    config: EngineConfig,
}

impl SecurityEngine {
    /// Creates an engine with the built-in rules and the system clock.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoResolver>,
    ) -> Result<Self, EngineError> {
        Self::with_clock(config, store, geo, Arc::new(SystemClock))
    }

    /// Creates an engine with an explicit clock (tests use
    /// [`vg_core::ManualClock`] here).
    pub fn with_clock(
        config: EngineConfig,
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoResolver>,
        clock: SharedClock,
    ) -> Result<Self, EngineError> {
        let mut rules = builtin_rules();
        if let Some(path) = &config.rules_file {
            rules = merge_rules(rules, load_rules_file(path)?);
        }
        Self::with_rules(config, store, geo, clock, rules)
    }

    /// Creates an engine with an explicit rule set.
    pub fn with_rules(
        config: EngineConfig,
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoResolver>,
        clock: SharedClock,
        rules: Vec<ThreatRule>,
    ) -> Result<Self, EngineError> {
        vg_observability::metrics::register_metrics();

        let bus = Arc::new(NotificationBus::new(config.bus_capacity));
        let alerts = Arc::new(AlertLog::new(config.alert_log_cap));
        let recent = Arc::new(RecentEvents::new(config.recent_events_cap));
        let profiles = Arc::new(ProfileStore::new(store.clone(), clock.clone()));
        let enforcement = Arc::new(EnforcementState::new(store.clone()));

        let evaluator = ConditionEvaluator::new(
            store.clone(),
            profiles.clone(),
            recent.clone(),
            clock.clone(),
        );
        let rule_engine = Arc::new(RuleEngine::new(rules, evaluator, store.clone())?);

        let incidents = Arc::new(IncidentManager::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            config.incident_retention(),
        ));
        let executor = Arc::new(
            ActionExecutor::new(
                enforcement.clone(),
                alerts.clone(),
                bus.clone(),
                clock.clone(),
                config.webhook_secret.clone(),
                config.webhook_timeout(),
            )
            .with_action_timeout(config.action_timeout()),
        );

        let recorder = EventRecorder::new(
            store,
            geo,
            profiles,
            enforcement.clone(),
            recent.clone(),
            rule_engine.clone(),
            incidents.clone(),
            executor,
            bus.clone(),
            clock.clone(),
            config.clone(),
        );

        Ok(Self {
            recorder,
            rules: rule_engine,
            incidents,
            enforcement,
            alerts,
            recent,
            bus,
            clock,
            config,
        })
    }

    /// Records an inbound event, running detection and response to
    /// completion before returning.
    pub async fn record_event(&self, event: NewEvent) -> Result<SecurityEvent, EngineError> {
        self.recorder.record(event).await
    }

    /// Whether a source address is currently blocked.
    pub async fn is_source_blocked(&self, ip: &IpAddr) -> bool {
        self.enforcement.is_source_blocked(ip).await
    }

    /// Whether a subject is currently suspended.
    pub async fn is_subject_suspended(&self, user_id: &str) -> bool {
        self.enforcement.is_subject_suspended(user_id).await
    }

    /// Whether a subject must complete step-up authentication.
    pub async fn is_step_up_required(&self, user_id: &str) -> bool {
        self.enforcement.is_step_up_required(user_id).await
    }

    /// All non-terminal incidents, newest first.
    pub async fn list_active_incidents(&self) -> Vec<Incident> {
        self.incidents.list_active().await
    }

    /// Looks up one incident.
    pub async fn get_incident(&self, incident_id: Uuid) -> Option<Incident> {
        self.incidents.get(incident_id).await
    }

    /// Marks a persisted event resolved. Returns whether it was found.
    pub async fn mark_event_resolved(&self, event_id: Uuid) -> Result<bool, EngineError> {
        self.recorder.mark_resolved(event_id).await
    }

    /// Ids from the durable most-recent-event list, newest first.
    pub async fn recent_event_ids(&self) -> Result<Vec<Uuid>, EngineError> {
        self.recorder.recent_event_ids().await
    }

    /// Point-in-time engine counts.
    pub async fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            recent_events: self.recent.len().await,
            total_incidents: self.incidents.total_count().await,
            active_incidents: self.incidents.active_count().await,
            blocked_sources: self.enforcement.blocked_count().await,
            suspended_subjects: self.enforcement.suspended_count().await,
            step_up_subjects: self.enforcement.step_up_count().await,
            rule_count: self.rules.rule_count().await,
            alerts_retained: self.alerts.len().await,
            notifications_published: self.bus.published_count(),
        }
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityNotification> {
        self.bus.subscribe()
    }

    /// Spawns the background sweeper tasks.
    pub fn start_sweeper(&self) -> SweeperHandle {
        Arc::new(Sweeper::new(
            self.enforcement.clone(),
            self.incidents.clone(),
            self.recent.clone(),
            self.clock.clone(),
            self.config.clone(),
        ))
        .spawn()
    }

    /// Runs one enforcement sweep synchronously (also driven by the
    /// background task on its own cadence).
    pub async fn sweep_enforcement_now(&self) {
        Sweeper::new(
            self.enforcement.clone(),
            self.incidents.clone(),
            self.recent.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
        .sweep_enforcement()
        .await;
    }

    /// Runs one retention pass synchronously.
    pub async fn run_retention_pass_now(&self) {
        Sweeper::new(
            self.enforcement.clone(),
            self.incidents.clone(),
            self.recent.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
        .run_retention_pass()
        .await;
    }

    /// The rule engine, for runtime rule management.
    pub fn rules(&self) -> &Arc<RuleEngine> {
        &self.rules
    }

    /// The incident manager, for manual incident operations.
    pub fn incidents(&self) -> &Arc<IncidentManager> {
        &self.incidents
    }

    /// The bounded alert log.
    pub fn alerts(&self) -> &Arc<AlertLog> {
        &self.alerts
    }
}
