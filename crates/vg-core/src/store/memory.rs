//! In-memory store implementation.
//!
//! Reference implementation of [`Store`] used in tests, development, and
//! single-instance deployments. Expiry is evaluated against the injected
//! [`Clock`], so TTL behavior is fully testable by advancing a
//! [`crate::clock::ManualClock`].

use super::{Store, StoreError, StoreResult};
use crate::clock::{Clock, SharedClock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Payload stored under a key.
#[derive(Debug, Clone)]
enum Payload {
    Bytes(Vec<u8>),
    Counter(i64),
    List(VecDeque<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    payload: Payload,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// An in-memory [`Store`] backed by a `HashMap` under a single lock.
///
/// A single write lock makes increment-and-read atomic, which the
/// sliding-window counters require.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl MemoryStore {
    /// Creates a store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store reading expiry against the given clock.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn expiry_for(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        if ttl.is_zero() {
            None
        } else {
            let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
            Some(self.clock.now() + ttl)
        }
    }

    /// Removes all expired entries.
    pub async fn cleanup_expired(&self) {
        let now = self.clock.now();
        let mut data = self.data.write().await;
        data.retain(|_, entry| !entry.is_expired(now));
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        self.data.write().await.clear();
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let data = self.data.read().await;
        data.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let data = self.data.read().await;
        match data.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.payload {
                Payload::Bytes(bytes) => Ok(Some(bytes.clone())),
                Payload::Counter(n) => Ok(Some(n.to_string().into_bytes())),
                Payload::List(_) => Err(StoreError::TypeMismatch(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let entry = Entry {
            payload: Payload::Bytes(value.to_vec()),
            expires_at: self.expiry_for(ttl),
        };
        self.data.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut data = self.data.write().await;
        match data.remove(key) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let data = self.data.read().await;
        Ok(matches!(data.get(key), Some(entry) if !entry.is_expired(now)))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let now = self.clock.now();
        let mut data = self.data.write().await;

        // An expired counter restarts the window.
        let fresh = match data.get(key) {
            Some(entry) if !entry.is_expired(now) => false,
            _ => true,
        };

        if fresh {
            let entry = Entry {
                payload: Payload::Counter(1),
                expires_at: self.expiry_for(ttl),
            };
            data.insert(key.to_string(), entry);
            return Ok(1);
        }

        let entry = data
            .get_mut(key)
            .ok_or_else(|| StoreError::Backend(format!("counter vanished: {key}")))?;
        match &mut entry.payload {
            Payload::Counter(n) => {
                *n += 1;
                Ok(*n)
            }
            _ => Err(StoreError::TypeMismatch(key.to_string())),
        }
    }

    async fn push_front(&self, key: &str, value: &[u8], max_len: usize) -> StoreResult<()> {
        let now = self.clock.now();
        let mut data = self.data.write().await;

        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            payload: Payload::List(VecDeque::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.payload = Payload::List(VecDeque::new());
            entry.expires_at = None;
        }

        match &mut entry.payload {
            Payload::List(list) => {
                list.push_front(value.to_vec());
                list.truncate(max_len);
                Ok(())
            }
            _ => Err(StoreError::TypeMismatch(key.to_string())),
        }
    }

    async fn list(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        let now = self.clock.now();
        let data = self.data.read().await;
        match data.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.payload {
                Payload::List(list) => Ok(list.iter().cloned().collect()),
                _ => Err(StoreError::TypeMismatch(key.to_string())),
            },
            _ => Ok(Vec::new()),
        }
    }
}
