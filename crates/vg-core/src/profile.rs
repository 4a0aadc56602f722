//! Per-subject behavioral baselines.
//!
//! A [`BehaviorProfile`] is created lazily on a subject's first
//! successful authentication and updated incrementally afterwards.
//! Conditions that need a baseline fail closed to "not anomalous" when
//! no profile exists yet. Profiles live in the durable store with a
//! 90-day TTL from last update; the [`ProfileStore`] is a read-through
//! layer, never the source of truth.

use crate::clock::SharedClock;
use crate::event::SecurityEvent;
use crate::geo::GeoLocation;
use crate::store::{Store, StoreError, StoreResult};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Known locations closer than this are considered the same place.
pub const LOCATION_DEDUPE_KM: f64 = 50.0;

/// Profiles are retained this long from their last update.
pub const PROFILE_RETENTION: Duration = Duration::from_secs(90 * 24 * 3600);

/// Seed value for requests-per-hour before any usage is observed.
const DEFAULT_AVG_REQUESTS_PER_HOUR: f64 = 10.0;

/// Initial trust score for a new profile.
const INITIAL_TRUST_SCORE: u8 = 50;

/// Coarse API usage baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUsagePattern {
    /// Average requests per hour.
    pub average_requests_per_hour: f64,
    /// Hours of day with the most activity.
    pub peak_hours: Vec<u32>,
    /// Providers/endpoints this subject commonly calls.
    pub common_providers: Vec<String>,
}

impl Default for ApiUsagePattern {
    fn default() -> Self {
        Self {
            average_requests_per_hour: DEFAULT_AVG_REQUESTS_PER_HOUR,
            peak_hours: Vec::new(),
            common_providers: Vec::new(),
        }
    }
}

/// Coarse credential access baseline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialAccessPattern {
    /// Average credential reads per day.
    pub average_accesses_per_day: f64,
    /// Credential providers this subject commonly accesses.
    pub common_providers: Vec<String>,
}

/// Per-dimension anomaly thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// Kilometers beyond every known location that counts as a
    /// location deviation.
    pub location_deviation_km: f64,
    /// Multiplier over the average request rate that counts as a rate
    /// anomaly when comparing against the baseline.
    pub rate_multiplier: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            location_deviation_km: 500.0,
            rate_multiplier: 3.0,
        }
    }
}

/// A subject's learned baseline of normal access patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    /// Owning subject.
    pub user_id: String,
    /// Hours of day (UTC) with observed successful logins.
    pub normal_login_hours: BTreeSet<u32>,
    /// Source addresses seen on successful logins.
    pub known_ips: HashSet<IpAddr>,
    /// Locations seen on successful logins, deduplicated by proximity.
    pub known_locations: Vec<GeoLocation>,
    /// API usage baseline.
    pub api_usage: ApiUsagePattern,
    /// Credential access baseline.
    pub credential_access: CredentialAccessPattern,
    /// Per-dimension anomaly thresholds.
    pub thresholds: AnomalyThresholds,
    /// Last update timestamp.
    pub last_updated: DateTime<Utc>,
    /// Trust score, 0-100.
    pub trust_score: u8,
}

impl BehaviorProfile {
    /// Creates a fresh profile with conservative defaults.
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            normal_login_hours: BTreeSet::new(),
            known_ips: HashSet::new(),
            known_locations: Vec::new(),
            api_usage: ApiUsagePattern::default(),
            credential_access: CredentialAccessPattern::default(),
            thresholds: AnomalyThresholds::default(),
            last_updated: now,
            trust_score: INITIAL_TRUST_SCORE,
        }
    }

    /// Smallest distance from `location` to any known location, or
    /// `None` when no locations have been observed yet.
    pub fn min_distance_km(&self, location: &GeoLocation) -> Option<f64> {
        self.known_locations
            .iter()
            .map(|known| known.distance_km(location))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Whether the hour of day is within observed login hours.
    pub fn is_usual_hour(&self, hour: u32) -> bool {
        self.normal_login_hours.contains(&hour)
    }

    /// Whether the address has been seen before.
    pub fn knows_ip(&self, ip: &IpAddr) -> bool {
        self.known_ips.contains(ip)
    }

    /// Folds a successful authentication into the baseline.
    pub fn record_login(&mut self, event: &SecurityEvent, now: DateTime<Utc>) {
        self.normal_login_hours.insert(event.timestamp.hour());
        self.known_ips.insert(event.source_ip);

        if let Some(location) = &event.location {
            let near_known = self
                .min_distance_km(location)
                .is_some_and(|d| d < LOCATION_DEDUPE_KM);
            if !near_known {
                self.known_locations.push(location.clone());
            }
        }

        self.trust_score = self.trust_score.saturating_add(1).min(100);
        self.last_updated = now;
    }

    /// Lowers the trust score after a rule trigger attributed to this
    /// subject.
    pub fn penalize(&mut self, amount: u8, now: DateTime<Utc>) {
        self.trust_score = self.trust_score.saturating_sub(amount);
        self.last_updated = now;
    }
}

/// Read-through store of behavior profiles keyed by subject id.
pub struct ProfileStore {
    store: Arc<dyn Store>,
    clock: SharedClock,
}

impl ProfileStore {
    /// Creates a profile store over the durable store.
    pub fn new(store: Arc<dyn Store>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn key(user_id: &str) -> String {
        format!("profile:{user_id}")
    }

    /// Loads a subject's profile, if one exists.
    pub async fn get(&self, user_id: &str) -> StoreResult<Option<BehaviorProfile>> {
        match self.store.get(&Self::key(user_id)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Persists a profile, refreshing its retention TTL.
    pub async fn save(&self, profile: &BehaviorProfile) -> StoreResult<()> {
        let bytes = serde_json::to_vec(profile)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .set(&Self::key(&profile.user_id), &bytes, PROFILE_RETENTION)
            .await
    }

    /// Folds a successful authentication into the subject's profile,
    /// creating it lazily on first login.
    pub async fn record_login(&self, event: &SecurityEvent) -> StoreResult<BehaviorProfile> {
        let Some(user_id) = event.user_id.as_deref() else {
            return Err(StoreError::Backend(
                "cannot record a login for an unattributed event".to_string(),
            ));
        };
        let now = self.clock.now();

        let mut profile = match self.get(user_id).await? {
            Some(profile) => profile,
            None => {
                debug!(user_id, "creating behavior profile on first login");
                BehaviorProfile::new(user_id, now)
            }
        };
        profile.record_login(event, now);
        self.save(&profile).await?;
        Ok(profile)
    }

    /// Applies a trust penalty if the subject has a profile.
    pub async fn penalize(&self, user_id: &str, amount: u8) -> StoreResult<()> {
        if let Some(mut profile) = self.get(user_id).await? {
            profile.penalize(amount, self.clock.now());
            self.save(&profile).await?;
        }
        Ok(())
    }

    /// Removes a subject's profile (data-retention purge).
    pub async fn purge(&self, user_id: &str) -> StoreResult<bool> {
        self.store.delete(&Self::key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::event::{actions, EventCategory, Severity};
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn login_event(user: &str, ip: &str, location: Option<GeoLocation>, at: DateTime<Utc>) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: at,
            category: EventCategory::Authentication,
            action: actions::LOGIN_SUCCESS.to_string(),
            user_id: Some(user.to_string()),
            source_ip: ip.parse().unwrap(),
            user_agent: String::new(),
            location,
            severity: Severity::Low,
            details: HashMap::new(),
            risk_score: 10,
            resolved: false,
            response_actions: Vec::new(),
        }
    }

    #[test]
    fn locations_dedupe_by_proximity() {
        let now = Utc::now();
        let mut profile = BehaviorProfile::new("u1", now);

        let sf = GeoLocation::at(37.7749, -122.4194);
        // Oakland is ~13 km from SF: same place for baseline purposes.
        let oakland = GeoLocation::at(37.8044, -122.2712);
        let nyc = GeoLocation::at(40.7128, -74.0060);

        profile.record_login(&login_event("u1", "1.1.1.1", Some(sf), now), now);
        profile.record_login(&login_event("u1", "1.1.1.2", Some(oakland), now), now);
        profile.record_login(&login_event("u1", "1.1.1.3", Some(nyc), now), now);

        assert_eq!(profile.known_locations.len(), 2);
    }

    #[test]
    fn trust_score_moves_and_saturates() {
        let now = Utc::now();
        let mut profile = BehaviorProfile::new("u1", now);
        assert_eq!(profile.trust_score, 50);

        profile.penalize(60, now);
        assert_eq!(profile.trust_score, 0);

        for _ in 0..200 {
            profile.record_login(&login_event("u1", "1.1.1.1", None, now), now);
        }
        assert_eq!(profile.trust_score, 100);
    }

    #[tokio::test]
    async fn store_creates_lazily_and_persists() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let profiles = ProfileStore::new(store, clock.clone());

        assert!(profiles.get("u1").await.unwrap().is_none());

        let event = login_event("u1", "8.8.8.8", None, clock.now());
        let profile = profiles.record_login(&event).await.unwrap();
        assert!(profile.is_usual_hour(9));
        assert!(profile.knows_ip(&"8.8.8.8".parse().unwrap()));

        let reloaded = profiles.get("u1").await.unwrap().unwrap();
        assert_eq!(reloaded.trust_score, 51);
    }

    #[tokio::test]
    async fn profile_expires_after_retention() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let profiles = ProfileStore::new(store, clock.clone());

        let event = login_event("u1", "8.8.8.8", None, clock.now());
        profiles.record_login(&event).await.unwrap();

        clock.advance(chrono::Duration::days(91));
        assert!(profiles.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn penalize_without_profile_is_a_noop() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let profiles = ProfileStore::new(store, clock);
        profiles.penalize("ghost", 5).await.unwrap();
        assert!(profiles.get("ghost").await.unwrap().is_none());
    }
}
