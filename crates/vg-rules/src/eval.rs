//! Condition evaluators.
//!
//! Each evaluator is an independent predicate over the triggering event,
//! the windowed counters in the durable store, the subject's behavior
//! profile, and the recent-events window. Evaluators that need a
//! baseline fail closed to "not anomalous" when the subject has no
//! profile yet.

use crate::condition::{
    BehaviorAnomalyParams, FailedAuthBurstParams, GeoAnomalyParams, PatternKind,
    RateAnomalyParams, SuspiciousPatternParams, ThreatCondition,
};
use chrono::Timelike;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};
use vg_core::clock::SharedClock;
use vg_core::event::{EventCategory, SecurityEvent};
use vg_core::profile::ProfileStore;
use vg_core::recent::RecentEvents;
use vg_core::store::{Store, StoreError};

/// Downloads in the window beyond which bulk download is flagged.
const BULK_DOWNLOAD_LIMIT: usize = 10;
/// Credential reads in the window beyond which enumeration is flagged.
const CREDENTIAL_ENUMERATION_LIMIT: usize = 20;
/// Total events in the window beyond which rapid access is flagged.
const RAPID_ACCESS_LIMIT: usize = 100;

/// Behavior anomaly score contributions.
const SCORE_UNUSUAL_HOUR: u8 = 20;
const SCORE_LOCATION_DEVIATION: u8 = 30;
const SCORE_UNKNOWN_IP: u8 = 15;
const SCORE_ANONYMIZED: u8 = 20;

/// Errors inside one condition evaluation.
///
/// The rule engine catches these per rule, logs them, and treats the
/// rule as not triggered.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Store error during evaluation: {0}")]
    Store(#[from] StoreError),
}

/// Evaluates conditions against shared engine state.
pub struct ConditionEvaluator {
    store: Arc<dyn Store>,
    profiles: Arc<ProfileStore>,
    recent: Arc<RecentEvents>,
    clock: SharedClock,
}

impl ConditionEvaluator {
    /// Creates an evaluator over the engine's shared state.
    pub fn new(
        store: Arc<dyn Store>,
        profiles: Arc<ProfileStore>,
        recent: Arc<RecentEvents>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            profiles,
            recent,
            clock,
        }
    }

    /// Evaluates one condition for a rule against an event.
    pub async fn evaluate(
        &self,
        rule_id: &str,
        condition: &ThreatCondition,
        event: &SecurityEvent,
    ) -> Result<bool, EvalError> {
        let matched = match condition {
            ThreatCondition::FailedAuthBurst(p) => {
                self.failed_auth_burst(rule_id, p, event).await?
            }
            ThreatCondition::GeoAnomaly(p) => self.geo_anomaly(p, event).await?,
            ThreatCondition::RateAnomaly(p) => self.rate_anomaly(rule_id, p, event).await?,
            ThreatCondition::BehaviorAnomaly(p) => self.behavior_anomaly(p, event).await?,
            ThreatCondition::SuspiciousPattern(p) => self.suspicious_pattern(p, event).await,
        };
        trace!(rule_id, kind = condition.kind(), matched, "condition evaluated");
        Ok(matched)
    }

    /// Counts failed authentications per (subject, source) or source
    /// within the window; triggers at the threshold.
    async fn failed_auth_burst(
        &self,
        rule_id: &str,
        params: &FailedAuthBurstParams,
        event: &SecurityEvent,
    ) -> Result<bool, EvalError> {
        if !event.is_failed_authentication() {
            return Ok(false);
        }

        let key = if params.check_user_and_ip {
            let user = event.user_id.as_deref().unwrap_or("-");
            format!(
                "counter:{rule_id}:failed_auth:user:{user}:ip:{}",
                event.source_ip
            )
        } else {
            format!("counter:{rule_id}:failed_auth:ip:{}", event.source_ip)
        };

        let count = self.store.increment(&key, params.window()).await?;
        debug!(rule_id, %count, threshold = params.threshold, "failed auth counter");
        Ok(count >= i64::from(params.threshold))
    }

    /// Triggers when the event location is farther than the limit from
    /// every known location. Fails closed without a profile or known
    /// locations.
    async fn geo_anomaly(
        &self,
        params: &GeoAnomalyParams,
        event: &SecurityEvent,
    ) -> Result<bool, EvalError> {
        let (Some(user_id), Some(location)) = (event.user_id.as_deref(), event.location.as_ref())
        else {
            return Ok(false);
        };

        let Some(profile) = self.profiles.get(user_id).await? else {
            return Ok(false);
        };
        let Some(min_distance) = profile.min_distance_km(location) else {
            return Ok(false);
        };

        debug!(
            user_id,
            min_distance_km = min_distance,
            limit_km = params.max_distance_km,
            "geo anomaly distance"
        );
        Ok(min_distance > params.max_distance_km)
    }

    /// Counts events per subject (or source) within the window and
    /// compares against the raw threshold, or the subject's baseline
    /// when requested and available.
    async fn rate_anomaly(
        &self,
        rule_id: &str,
        params: &RateAnomalyParams,
        event: &SecurityEvent,
    ) -> Result<bool, EvalError> {
        let key = match (&event.user_id, params.per_user) {
            (Some(user), true) => format!("counter:{rule_id}:rate:user:{user}"),
            _ => format!("counter:{rule_id}:rate:ip:{}", event.source_ip),
        };
        let count = self.store.increment(&key, params.window()).await?;

        if params.compare_to_baseline {
            if let Some(user_id) = event.user_id.as_deref() {
                if let Some(profile) = self.profiles.get(user_id).await? {
                    let rate_per_hour =
                        count as f64 * 3600.0 / params.window_secs as f64;
                    let limit = profile.api_usage.average_requests_per_hour
                        * profile.thresholds.rate_multiplier;
                    debug!(user_id, rate_per_hour, limit, "rate anomaly baseline check");
                    return Ok(rate_per_hour > limit);
                }
            }
        }

        Ok(count >= i64::from(params.threshold))
    }

    /// Sums anomaly score contributions against the subject's baseline.
    /// Fails closed to score 0 without a profile.
    async fn behavior_anomaly(
        &self,
        params: &BehaviorAnomalyParams,
        event: &SecurityEvent,
    ) -> Result<bool, EvalError> {
        let Some(user_id) = event.user_id.as_deref() else {
            return Ok(false);
        };
        let Some(profile) = self.profiles.get(user_id).await? else {
            return Ok(false);
        };

        let mut score: u8 = 0;

        if !profile.is_usual_hour(event.timestamp.hour()) {
            score = score.saturating_add(SCORE_UNUSUAL_HOUR);
        }

        if let Some(location) = &event.location {
            let deviates = profile
                .min_distance_km(location)
                .is_some_and(|d| d > profile.thresholds.location_deviation_km);
            if deviates {
                score = score.saturating_add(SCORE_LOCATION_DEVIATION);
            }
            if location.is_anonymized() {
                score = score.saturating_add(SCORE_ANONYMIZED);
            }
        }

        if !profile.knows_ip(&event.source_ip) {
            score = score.saturating_add(SCORE_UNKNOWN_IP);
        }

        debug!(user_id, score, threshold = params.threshold, "behavior anomaly score");
        Ok(score >= params.threshold)
    }

    /// Scans the recent-events window for the subject and requires every
    /// listed pattern to be present.
    async fn suspicious_pattern(
        &self,
        params: &SuspiciousPatternParams,
        event: &SecurityEvent,
    ) -> bool {
        let Some(user_id) = event.user_id.as_deref() else {
            return false;
        };

        let window = chrono::Duration::from_std(params.window())
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let events = self
            .recent
            .for_user_within(user_id, window, self.clock.now())
            .await;

        let downloads = events.iter().filter(|e| e.is_download()).count();
        let credential_reads = events
            .iter()
            .filter(|e| e.category == EventCategory::CredentialAccess)
            .count();
        let total = events.len();

        let detected = |pattern: &PatternKind| match pattern {
            PatternKind::BulkDownload => downloads > BULK_DOWNLOAD_LIMIT,
            PatternKind::CredentialEnumeration => credential_reads > CREDENTIAL_ENUMERATION_LIMIT,
            PatternKind::RapidAccess => total > RAPID_ACCESS_LIMIT,
        };

        let matched = params.patterns.iter().all(detected);
        if matched {
            debug!(user_id, downloads, credential_reads, total, "suspicious pattern matched");
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{FailedAuthBurstParams, GeoAnomalyParams};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use uuid::Uuid;
    use vg_core::clock::{Clock, ManualClock};
    use vg_core::event::{actions, Severity};
    use vg_core::geo::GeoLocation;
    use vg_core::store::MemoryStore;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        profiles: Arc<ProfileStore>,
        recent: Arc<RecentEvents>,
        evaluator: ConditionEvaluator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let profiles = Arc::new(ProfileStore::new(store.clone(), clock.clone()));
        let recent = Arc::new(RecentEvents::default());
        let evaluator = ConditionEvaluator::new(
            store.clone(),
            profiles.clone(),
            recent.clone(),
            clock.clone(),
        );
        Fixture {
            clock,
            store,
            profiles,
            recent,
            evaluator,
        }
    }

    fn event(
        category: EventCategory,
        action: &str,
        user: Option<&str>,
        ip: &str,
        at: chrono::DateTime<Utc>,
    ) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: at,
            category,
            action: action.to_string(),
            user_id: user.map(str::to_string),
            source_ip: ip.parse().unwrap(),
            user_agent: String::new(),
            location: None,
            severity: Severity::Low,
            details: HashMap::new(),
            risk_score: 10,
            resolved: false,
            response_actions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn failed_auth_burst_triggers_at_threshold() {
        let f = fixture();
        let params = FailedAuthBurstParams {
            threshold: 5,
            window_secs: 300,
            check_user_and_ip: true,
        };

        for i in 1..=4 {
            let e = event(
                EventCategory::Authentication,
                actions::LOGIN_FAILED,
                Some("u1"),
                "10.0.0.5",
                f.clock.now(),
            );
            let hit = f.evaluator.failed_auth_burst("r1", &params, &e).await.unwrap();
            assert!(!hit, "should not trigger at count {i}");
        }

        let e = event(
            EventCategory::Authentication,
            actions::LOGIN_FAILED,
            Some("u1"),
            "10.0.0.5",
            f.clock.now(),
        );
        assert!(f.evaluator.failed_auth_burst("r1", &params, &e).await.unwrap());
    }

    #[tokio::test]
    async fn failed_auth_counter_is_scoped_by_user_and_ip() {
        let f = fixture();
        let params = FailedAuthBurstParams {
            threshold: 2,
            window_secs: 300,
            check_user_and_ip: true,
        };

        let a = event(
            EventCategory::Authentication,
            actions::LOGIN_FAILED,
            Some("u1"),
            "10.0.0.5",
            f.clock.now(),
        );
        let b = event(
            EventCategory::Authentication,
            actions::LOGIN_FAILED,
            Some("u2"),
            "10.0.0.5",
            f.clock.now(),
        );
        assert!(!f.evaluator.failed_auth_burst("r1", &params, &a).await.unwrap());
        // Different subject: separate counter, still below threshold.
        assert!(!f.evaluator.failed_auth_burst("r1", &params, &b).await.unwrap());
        assert!(f.evaluator.failed_auth_burst("r1", &params, &a).await.unwrap());
    }

    #[tokio::test]
    async fn failed_auth_ignores_other_categories() {
        let f = fixture();
        let params = FailedAuthBurstParams {
            threshold: 1,
            window_secs: 300,
            check_user_and_ip: false,
        };
        let e = event(
            EventCategory::ApiUsage,
            "request",
            Some("u1"),
            "10.0.0.5",
            f.clock.now(),
        );
        assert!(!f.evaluator.failed_auth_burst("r1", &params, &e).await.unwrap());
    }

    #[tokio::test]
    async fn geo_anomaly_fails_closed_without_profile() {
        let f = fixture();
        let params = GeoAnomalyParams {
            max_distance_km: 1000.0,
        };
        let mut e = event(
            EventCategory::Authentication,
            actions::LOGIN_SUCCESS,
            Some("u1"),
            "8.8.8.8",
            f.clock.now(),
        );
        e.location = Some(GeoLocation::at(48.85, 2.35));
        assert!(!f.evaluator.geo_anomaly(&params, &e).await.unwrap());
    }

    #[tokio::test]
    async fn geo_anomaly_triggers_beyond_limit() {
        let f = fixture();

        // Seed a profile with a San Francisco login.
        let mut seed = event(
            EventCategory::Authentication,
            actions::LOGIN_SUCCESS,
            Some("u2"),
            "8.8.8.8",
            f.clock.now(),
        );
        seed.location = Some(GeoLocation::at(37.77, -122.42));
        f.profiles.record_login(&seed).await.unwrap();

        let params = GeoAnomalyParams {
            max_distance_km: 1000.0,
        };

        // Paris is ~8950 km from San Francisco.
        let mut far = seed.clone();
        far.location = Some(GeoLocation::at(48.85, 2.35));
        assert!(f.evaluator.geo_anomaly(&params, &far).await.unwrap());

        // Los Angeles is ~560 km away: inside the limit.
        let mut near = seed.clone();
        near.location = Some(GeoLocation::at(34.05, -118.24));
        assert!(!f.evaluator.geo_anomaly(&params, &near).await.unwrap());
    }

    #[tokio::test]
    async fn rate_anomaly_raw_threshold() {
        let f = fixture();
        let params = RateAnomalyParams {
            threshold: 3,
            window_secs: 600,
            per_user: true,
            compare_to_baseline: false,
        };
        let e = event(
            EventCategory::ApiUsage,
            "request",
            Some("u1"),
            "8.8.8.8",
            f.clock.now(),
        );
        assert!(!f.evaluator.rate_anomaly("r", &params, &e).await.unwrap());
        assert!(!f.evaluator.rate_anomaly("r", &params, &e).await.unwrap());
        assert!(f.evaluator.rate_anomaly("r", &params, &e).await.unwrap());
    }

    #[tokio::test]
    async fn rate_anomaly_baseline_comparison() {
        let f = fixture();

        let seed = event(
            EventCategory::Authentication,
            actions::LOGIN_SUCCESS,
            Some("u3"),
            "8.8.8.8",
            f.clock.now(),
        );
        f.profiles.record_login(&seed).await.unwrap();

        // Baseline 10 req/h, multiplier 3: the windowed rate must exceed
        // 30 req/h. A 1-hour window needs > 30 events.
        let params = RateAnomalyParams {
            threshold: 100_000,
            window_secs: 3600,
            per_user: true,
            compare_to_baseline: true,
        };
        let e = event(
            EventCategory::ApiUsage,
            "request",
            Some("u3"),
            "8.8.8.8",
            f.clock.now(),
        );

        let mut triggered = false;
        for _ in 0..31 {
            triggered = f.evaluator.rate_anomaly("r", &params, &e).await.unwrap();
        }
        assert!(triggered);
    }

    #[tokio::test]
    async fn behavior_anomaly_scores_dimensions() {
        let f = fixture();

        // Known: hour 12, ip 8.8.8.8, location SF.
        let mut seed = event(
            EventCategory::Authentication,
            actions::LOGIN_SUCCESS,
            Some("u4"),
            "8.8.8.8",
            f.clock.now(),
        );
        seed.location = Some(GeoLocation::at(37.77, -122.42));
        f.profiles.record_login(&seed).await.unwrap();

        // Unusual hour (+20), far location (+30), unknown ip (+15),
        // anonymized (+20): score 85.
        let mut anomalous = event(
            EventCategory::SystemAccess,
            "admin_login",
            Some("u4"),
            "1.2.3.4",
            Utc.with_ymd_and_hms(2024, 6, 2, 3, 0, 0).unwrap(),
        );
        let mut far = GeoLocation::at(48.85, 2.35);
        far.is_anonymous_proxy = true;
        anomalous.location = Some(far);

        assert!(f
            .evaluator
            .behavior_anomaly(&BehaviorAnomalyParams { threshold: 85 }, &anomalous)
            .await
            .unwrap());
        assert!(!f
            .evaluator
            .behavior_anomaly(&BehaviorAnomalyParams { threshold: 90 }, &anomalous)
            .await
            .unwrap());

        // The seed event itself scores 0.
        assert!(!f
            .evaluator
            .behavior_anomaly(&BehaviorAnomalyParams { threshold: 10 }, &seed)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn suspicious_pattern_requires_all_listed_patterns() {
        let f = fixture();
        let now = f.clock.now();

        for _ in 0..101 {
            f.recent
                .push(event(EventCategory::ApiUsage, "request", Some("u5"), "8.8.8.8", now))
                .await;
        }

        let rapid = SuspiciousPatternParams {
            window_secs: 600,
            patterns: vec![PatternKind::RapidAccess],
        };
        let probe = event(EventCategory::ApiUsage, "request", Some("u5"), "8.8.8.8", now);
        assert!(f.evaluator.suspicious_pattern(&rapid, &probe).await);

        // Also requiring bulk_download: none of the 101 events are
        // downloads, so the condition does not hold.
        let both = SuspiciousPatternParams {
            window_secs: 600,
            patterns: vec![PatternKind::RapidAccess, PatternKind::BulkDownload],
        };
        assert!(!f.evaluator.suspicious_pattern(&both, &probe).await);

        for _ in 0..11 {
            f.recent
                .push(event(
                    EventCategory::DataAccess,
                    actions::DOWNLOAD,
                    Some("u5"),
                    "8.8.8.8",
                    now,
                ))
                .await;
        }
        assert!(f.evaluator.suspicious_pattern(&both, &probe).await);
    }

    #[tokio::test]
    async fn counters_reset_after_window() {
        let f = fixture();
        let params = FailedAuthBurstParams {
            threshold: 3,
            window_secs: 300,
            check_user_and_ip: false,
        };
        let e = event(
            EventCategory::Authentication,
            actions::LOGIN_FAILED,
            None,
            "9.9.9.9",
            f.clock.now(),
        );

        f.evaluator.failed_auth_burst("r", &params, &e).await.unwrap();
        f.evaluator.failed_auth_burst("r", &params, &e).await.unwrap();

        f.clock.advance(chrono::Duration::seconds(301));
        // Window lapsed: the third failure is count 1 again.
        assert!(!f.evaluator.failed_auth_burst("r", &params, &e).await.unwrap());
        let _ = f.store;
    }
}
