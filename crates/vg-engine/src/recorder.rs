//! The event recorder: entry point of the engine.
//!
//! Materializes an inbound partial event (geo resolution, risk scoring),
//! persists it, evaluates every enabled rule against it, drives incident
//! creation and action execution for triggers, and folds successful
//! authentications into the subject's behavior profile.
//!
//! Each event is processed end-to-end before `record` returns, so the
//! side effects of a single event are totally ordered with respect to
//! each other.

use crate::config::EngineConfig;
use crate::incidents::IncidentManager;
use crate::risk::{self, RiskInputs};
use chrono::Timelike;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use vg_actions::ActionExecutor;
use vg_core::bus::{NotificationBus, SecurityNotification};
use vg_core::clock::SharedClock;
use vg_core::enforcement::EnforcementState;
use vg_core::event::{NewEvent, SecurityEvent, Severity};
use vg_core::geo::{self, GeoLocation, GeoResolver};
use vg_core::incident::IncidentError;
use vg_core::profile::ProfileStore;
use vg_core::recent::RecentEvents;
use vg_core::store::{Store, StoreError};
use vg_observability::metrics as obs;
use vg_rules::RuleEngine;

/// Key of the durable most-recent-event-id list.
const RECENT_EVENT_IDS_KEY: &str = "events:recent";

/// Errors surfaced by the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The inbound event description is malformed; nothing was persisted.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event itself could not be persisted. Retryable.
    #[error("Failed to persist event: {0}")]
    Persistence(StoreError),

    /// An incident operation failed.
    #[error(transparent)]
    Incident(#[from] IncidentError),

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// A rule failed validation.
    #[error(transparent)]
    Rule(#[from] vg_rules::RuleError),
}

/// Materializes, persists, and dispatches security events.
pub struct EventRecorder {
    store: Arc<dyn Store>,
    geo: Arc<dyn GeoResolver>,
    profiles: Arc<ProfileStore>,
    enforcement: Arc<EnforcementState>,
    recent: Arc<RecentEvents>,
    rules: Arc<RuleEngine>,
    incidents: Arc<IncidentManager>,
    executor: Arc<ActionExecutor>,
    bus: Arc<NotificationBus>,
    clock: SharedClock,
    config: EngineConfig,
}

impl EventRecorder {
    /// Wires the recorder over the engine's shared components.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoResolver>,
        profiles: Arc<ProfileStore>,
        enforcement: Arc<EnforcementState>,
        recent: Arc<RecentEvents>,
        rules: Arc<RuleEngine>,
        incidents: Arc<IncidentManager>,
        executor: Arc<ActionExecutor>,
        bus: Arc<NotificationBus>,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            geo,
            profiles,
            enforcement,
            recent,
            rules,
            incidents,
            executor,
            bus,
            clock,
            config,
        }
    }

    /// Records an inbound event and drives detection and response.
    ///
    /// Collaborator failures (geo lookup, webhook, incident persistence)
    /// are logged and absorbed; only a malformed event or a failed write
    /// of the event itself is surfaced.
    #[instrument(skip(self, new), fields(category = new.category.as_str(), action = %new.action))]
    pub async fn record(&self, new: NewEvent) -> Result<SecurityEvent, EngineError> {
        if new.action.trim().is_empty() {
            return Err(EngineError::InvalidEvent(
                "action must not be empty".to_string(),
            ));
        }
        if matches!(new.user_id.as_deref(), Some("")) {
            return Err(EngineError::InvalidEvent(
                "subject id must not be empty when present".to_string(),
            ));
        }

        let now = self.clock.now();
        let location = self.resolve_location(&new).await;

        let source_blocked = self.enforcement.is_source_blocked(&new.source_ip).await;
        let subject_suspended = match new.user_id.as_deref() {
            Some(user_id) => self.enforcement.is_subject_suspended(user_id).await,
            None => false,
        };

        let risk_score = risk::score(&RiskInputs {
            category: new.category,
            action: &new.action,
            location: location.as_ref(),
            hour_of_day: now.hour(),
            source_blocked,
            subject_suspended,
        });
        let severity = new
            .severity
            .unwrap_or_else(|| Severity::from_risk_score(risk_score));

        let mut event = SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: now,
            category: new.category,
            action: new.action,
            user_id: new.user_id,
            source_ip: new.source_ip,
            user_agent: new.user_agent,
            location,
            severity,
            details: new.details,
            risk_score,
            resolved: false,
            response_actions: Vec::new(),
        };

        self.persist_event(&event)
            .await
            .map_err(EngineError::Persistence)?;
        self.push_recent_id(event.id).await;
        self.recent.push(event.clone()).await;

        obs::record_event(event.category.as_str());
        debug!(event_id = %event.id, risk_score, "event recorded");
        self.bus
            .publish(SecurityNotification::EventRecorded(event.clone()));

        let triggered = self.rules.evaluate_event(&event).await;
        for rule in &triggered {
            obs::record_rule_trigger(&rule.id);
            if let Some(user_id) = event.user_id.as_deref() {
                if let Err(error) = self
                    .profiles
                    .penalize(user_id, self.config.trust_penalty)
                    .await
                {
                    warn!(user_id, %error, "failed to apply trust penalty");
                }
            }

            let incident_id = self.incidents.create(rule, &event).await;
            let results = self.executor.run(rule, &event, incident_id).await;
            event
                .response_actions
                .extend(results.iter().map(|r| r.action.clone()));
            if let Err(error) = self.incidents.record_results(incident_id, results).await {
                warn!(incident_id = %incident_id, %error, "failed to record action outcomes");
            }
            info!(rule_id = %rule.id, incident_id = %incident_id, "rule trigger handled");
        }

        if !triggered.is_empty() {
            // Append-only update of the applied response actions.
            if let Err(error) = self.persist_event(&event).await {
                warn!(event_id = %event.id, %error, "failed to update event response actions");
            }
        }

        if event.is_successful_authentication() {
            if let Err(error) = self.profiles.record_login(&event).await {
                warn!(%error, "failed to update behavior profile");
            }
        }

        Ok(event)
    }

    /// Resolves the source address, short-circuiting non-global ranges
    /// and bounding the external call with the configured timeout.
    async fn resolve_location(&self, new: &NewEvent) -> Option<GeoLocation> {
        if geo::is_non_global(&new.source_ip) {
            return Some(GeoLocation::local());
        }

        let lookup = self.geo.resolve(new.source_ip);
        match tokio::time::timeout(self.config.geo_timeout(), lookup).await {
            Ok(Ok(location)) => Some(location),
            Ok(Err(error)) => {
                obs::record_geo_failure();
                warn!(source_ip = %new.source_ip, %error, "geo resolution failed");
                None
            }
            Err(_) => {
                obs::record_geo_failure();
                warn!(source_ip = %new.source_ip, "geo resolution timed out");
                None
            }
        }
    }

    async fn persist_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(event)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .set(
                &format!("event:{}", event.id),
                &bytes,
                self.config.event_retention(),
            )
            .await
    }

    /// Marks a persisted event resolved (append-only update).
    ///
    /// Returns whether the event was found.
    pub async fn mark_resolved(&self, event_id: Uuid) -> Result<bool, EngineError> {
        let key = format!("event:{event_id}");
        let Some(bytes) = self
            .store
            .get(&key)
            .await
            .map_err(EngineError::Persistence)?
        else {
            return Ok(false);
        };
        let mut event: SecurityEvent = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::Persistence(StoreError::Serialization(e.to_string())))?;
        event.resolved = true;
        self.persist_event(&event)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(true)
    }

    /// Ids from the durable most-recent-event list, newest first.
    pub async fn recent_event_ids(&self) -> Result<Vec<Uuid>, EngineError> {
        let entries = self
            .store
            .list(RECENT_EVENT_IDS_KEY)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(entries
            .iter()
            .filter_map(|bytes| std::str::from_utf8(bytes).ok())
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect())
    }

    async fn push_recent_id(&self, id: Uuid) {
        if let Err(error) = self
            .store
            .push_front(
                RECENT_EVENT_IDS_KEY,
                id.to_string().as_bytes(),
                self.config.recent_events_cap,
            )
            .await
        {
            warn!(%error, "failed to append to recent event id list");
        }
    }
}
