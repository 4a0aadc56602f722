//! Block, suspension, and step-up enforcement markers.
//!
//! Each marker is a TTL-bounded entry in the durable store plus a
//! membership in an in-memory set used for fast queries. The in-memory
//! sets are a read-through cache: a miss consults the store (so
//! replicas see each other's markers), and the background sweep drops
//! members whose durable marker has expired.

use crate::store::{Store, StoreResult};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Enforcement marker sets backed by durable TTL markers.
pub struct EnforcementState {
    store: Arc<dyn Store>,
    blocked_ips: RwLock<HashSet<IpAddr>>,
    suspended_users: RwLock<HashSet<String>>,
    step_up_users: RwLock<HashSet<String>>,
}

/// Counts of entries dropped by one enforcement sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub blocks_dropped: usize,
    pub suspensions_dropped: usize,
    pub step_ups_dropped: usize,
}

impl SweepStats {
    /// Total entries dropped.
    pub fn total(&self) -> usize {
        self.blocks_dropped + self.suspensions_dropped + self.step_ups_dropped
    }
}

impl EnforcementState {
    /// Creates enforcement state over the durable store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            blocked_ips: RwLock::new(HashSet::new()),
            suspended_users: RwLock::new(HashSet::new()),
            step_up_users: RwLock::new(HashSet::new()),
        }
    }

    fn block_key(ip: &IpAddr) -> String {
        format!("block:{ip}")
    }

    fn suspend_key(user_id: &str) -> String {
        format!("suspend:{user_id}")
    }

    fn step_up_key(user_id: &str) -> String {
        format!("stepup:{user_id}")
    }

    /// Blocks a source address for `ttl`.
    pub async fn block_source(&self, ip: IpAddr, ttl: Duration) -> StoreResult<()> {
        self.store.set(&Self::block_key(&ip), b"1", ttl).await?;
        self.blocked_ips.write().await.insert(ip);
        info!(%ip, ttl_secs = ttl.as_secs(), "source address blocked");
        Ok(())
    }

    /// Suspends a subject for `ttl`.
    pub async fn suspend_subject(&self, user_id: &str, ttl: Duration) -> StoreResult<()> {
        self.store.set(&Self::suspend_key(user_id), b"1", ttl).await?;
        self.suspended_users
            .write()
            .await
            .insert(user_id.to_string());
        info!(user_id, ttl_secs = ttl.as_secs(), "subject suspended");
        Ok(())
    }

    /// Requires step-up authentication from a subject for `ttl`.
    pub async fn require_step_up(&self, user_id: &str, ttl: Duration) -> StoreResult<()> {
        self.store.set(&Self::step_up_key(user_id), b"1", ttl).await?;
        self.step_up_users
            .write()
            .await
            .insert(user_id.to_string());
        info!(user_id, ttl_secs = ttl.as_secs(), "step-up authentication required");
        Ok(())
    }

    /// Whether a source address is currently blocked.
    ///
    /// Membership in the in-memory set answers immediately; a miss falls
    /// through to the durable marker so markers written by other
    /// replicas are honored.
    pub async fn is_source_blocked(&self, ip: &IpAddr) -> bool {
        if self.blocked_ips.read().await.contains(ip) {
            return true;
        }
        if self.store.exists(&Self::block_key(ip)).await.unwrap_or(false) {
            self.blocked_ips.write().await.insert(*ip);
            return true;
        }
        false
    }

    /// Whether a subject is currently suspended.
    pub async fn is_subject_suspended(&self, user_id: &str) -> bool {
        if self.suspended_users.read().await.contains(user_id) {
            return true;
        }
        if self
            .store
            .exists(&Self::suspend_key(user_id))
            .await
            .unwrap_or(false)
        {
            self.suspended_users
                .write()
                .await
                .insert(user_id.to_string());
            return true;
        }
        false
    }

    /// Whether a subject currently has a step-up requirement.
    pub async fn is_step_up_required(&self, user_id: &str) -> bool {
        if self.step_up_users.read().await.contains(user_id) {
            return true;
        }
        if self
            .store
            .exists(&Self::step_up_key(user_id))
            .await
            .unwrap_or(false)
        {
            self.step_up_users
                .write()
                .await
                .insert(user_id.to_string());
            return true;
        }
        false
    }

    /// Drops in-memory members whose durable marker has expired.
    pub async fn sweep_expired(&self) -> StoreResult<SweepStats> {
        let mut stats = SweepStats::default();

        let blocked: Vec<IpAddr> = self.blocked_ips.read().await.iter().copied().collect();
        for ip in blocked {
            if !self.store.exists(&Self::block_key(&ip)).await? {
                self.blocked_ips.write().await.remove(&ip);
                stats.blocks_dropped += 1;
                debug!(%ip, "block expired");
            }
        }

        let suspended: Vec<String> =
            self.suspended_users.read().await.iter().cloned().collect();
        for user_id in suspended {
            if !self.store.exists(&Self::suspend_key(&user_id)).await? {
                self.suspended_users.write().await.remove(&user_id);
                stats.suspensions_dropped += 1;
                debug!(user_id, "suspension expired");
            }
        }

        let step_ups: Vec<String> = self.step_up_users.read().await.iter().cloned().collect();
        for user_id in step_ups {
            if !self.store.exists(&Self::step_up_key(&user_id)).await? {
                self.step_up_users.write().await.remove(&user_id);
                stats.step_ups_dropped += 1;
                debug!(user_id, "step-up requirement expired");
            }
        }

        Ok(stats)
    }

    /// Number of blocked addresses.
    pub async fn blocked_count(&self) -> usize {
        self.blocked_ips.read().await.len()
    }

    /// Number of suspended subjects.
    pub async fn suspended_count(&self) -> usize {
        self.suspended_users.read().await.len()
    }

    /// Number of subjects with a step-up requirement.
    pub async fn step_up_count(&self) -> usize {
        self.step_up_users.read().await.len()
    }
}
