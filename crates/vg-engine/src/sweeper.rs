//! Background maintenance tasks.
//!
//! Three independent periodic tasks: a fast enforcement sweep that drops
//! in-memory markers whose durable TTL lapsed, a profile re-evaluation
//! pass (extension point), and an hourly retention pass that prunes old
//! events and auto-resolves stale incidents.
//!
//! The decision logic lives in plain async methods driven by the
//! injectable clock; the timers only provide cadence. Tests call the
//! methods directly after advancing the clock.

use crate::config::EngineConfig;
use crate::incidents::IncidentManager;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vg_core::clock::SharedClock;
use vg_core::enforcement::EnforcementState;
use vg_core::recent::RecentEvents;
use vg_observability::metrics as obs;

/// Background sweeper over the engine's shared state.
pub struct Sweeper {
    enforcement: Arc<EnforcementState>,
    incidents: Arc<IncidentManager>,
    recent: Arc<RecentEvents>,
    clock: SharedClock,
    config: EngineConfig,
}

/// Handle to the spawned sweeper tasks.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals all tasks to stop and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Sweeper {
    /// Creates a sweeper over the engine's shared state.
    pub fn new(
        enforcement: Arc<EnforcementState>,
        incidents: Arc<IncidentManager>,
        recent: Arc<RecentEvents>,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        Self {
            enforcement,
            incidents,
            recent,
            clock,
            config,
        }
    }

    /// Spawns the three periodic tasks.
    pub fn spawn(self: Arc<Self>) -> SweeperHandle {
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::with_capacity(3);

        {
            let sweeper = self.clone();
            let mut rx = shutdown.subscribe();
            let period = self.config.sweeper.enforcement_interval();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => sweeper.sweep_enforcement().await,
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        {
            let sweeper = self.clone();
            let mut rx = shutdown.subscribe();
            let period = self.config.sweeper.profile_interval();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => sweeper.reevaluate_profiles().await,
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        {
            let sweeper = self;
            let mut rx = shutdown.subscribe();
            let period = sweeper.config.sweeper.retention_interval();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => sweeper.run_retention_pass().await,
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        SweeperHandle { shutdown, tasks }
    }

    /// Drops in-memory enforcement markers whose durable TTL lapsed.
    pub async fn sweep_enforcement(&self) {
        match self.enforcement.sweep_expired().await {
            Ok(stats) if stats.total() > 0 => {
                info!(
                    blocks = stats.blocks_dropped,
                    suspensions = stats.suspensions_dropped,
                    step_ups = stats.step_ups_dropped,
                    "expired enforcement markers dropped"
                );
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "enforcement sweep failed"),
        }
        obs::set_enforcement_gauges(
            self.enforcement.blocked_count().await,
            self.enforcement.suspended_count().await,
        );
    }

    /// Aggregate profile re-evaluation.
    ///
    /// Extension point: no mandatory work is defined for this pass yet.
    pub async fn reevaluate_profiles(&self) {
        debug!("profile re-evaluation pass");
    }

    /// Prunes retained events past the retention window and closes
    /// stale incidents. Durable copies expire via their TTLs.
    pub async fn run_retention_pass(&self) {
        let now = self.clock.now();
        let cutoff = now
            - chrono::Duration::from_std(self.config.event_retention())
                .unwrap_or_else(|_| chrono::Duration::days(30));

        let pruned = self.recent.purge_older_than(cutoff).await;
        if pruned > 0 {
            info!(pruned, "events pruned from the recent window");
        }

        let resolved = self
            .incidents
            .auto_resolve_stale(self.config.auto_resolve_after())
            .await;
        if resolved > 0 {
            info!(resolved, "stale incidents auto-resolved");
        }

        let retention = chrono::Duration::from_std(self.config.incident_retention())
            .unwrap_or_else(|_| chrono::Duration::days(30));
        let purged = self.incidents.purge_expired(retention).await;
        if purged > 0 {
            info!(purged, "expired incidents dropped from memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use vg_core::bus::NotificationBus;
    use vg_core::clock::ManualClock;
    use vg_core::store::{MemoryStore, Store};

    fn sweeper() -> (Arc<ManualClock>, Arc<MemoryStore>, Sweeper) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let enforcement = Arc::new(EnforcementState::new(store.clone()));
        let bus = Arc::new(NotificationBus::default());
        let incidents = Arc::new(IncidentManager::new(
            store.clone(),
            bus,
            clock.clone(),
            Duration::from_secs(30 * 86400),
        ));
        let recent = Arc::new(RecentEvents::default());
        let sweeper = Sweeper::new(
            enforcement,
            incidents,
            recent,
            clock.clone(),
            EngineConfig::default(),
        );
        (clock, store, sweeper)
    }

    #[tokio::test]
    async fn enforcement_sweep_drops_expired_blocks() {
        let (clock, _store, sweeper) = sweeper();
        sweeper
            .enforcement
            .block_source("10.0.0.5".parse().unwrap(), Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(61));
        sweeper.sweep_enforcement().await;
        assert!(
            !sweeper
                .enforcement
                .is_source_blocked(&"10.0.0.5".parse().unwrap())
                .await
        );
    }

    #[tokio::test]
    async fn spawn_and_shutdown_cleanly() {
        let (_clock, store, sweeper) = sweeper();
        let handle = Arc::new(sweeper).spawn();
        handle.shutdown().await;
        // Store still usable after shutdown.
        assert!(!store.exists("anything").await.unwrap());
    }
}
