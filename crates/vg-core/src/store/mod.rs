//! Durable key-value store collaborator boundary.
//!
//! The engine keeps all state that must survive restarts (or be shared
//! between replicas) behind the [`Store`] trait: persisted events, rule
//! cooldown markers, block/suspension/step-up markers, behavior
//! profiles, and the sliding-window counters used by burst and rate
//! conditions. In-process caches are read-through layers over this
//! store, never the source of truth.
//!
//! A TTL of `Duration::ZERO` means the entry never expires. Counter
//! increments are atomic: `increment` must return the post-increment
//! value and apply the TTL exactly once, when the counter is created.

mod memory;
#[cfg(feature = "redis-store")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis::{RedisStore, RedisStoreConfig};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Failed to reach the store backend.
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// Failed to encode or decode a stored value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The key holds a value of a different shape than the operation expects.
    #[error("Type mismatch for key: {0}")]
    TypeMismatch(String),

    /// Backend-specific failure.
    #[error("Store error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value store with TTL, atomic counters, and bounded lists.
///
/// Implementations must be thread-safe and cheap to share across tasks.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Gets a value by key. Returns `None` for missing or expired keys.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Sets a value with a TTL. `Duration::ZERO` means no expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Deletes a key. Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Whether a key exists and has not expired.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically increments a counter and returns the new value.
    ///
    /// The TTL is applied when the counter is created; later increments
    /// within the window do not extend it.
    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Pushes a value to the front of a list, trimming it to `max_len`.
    async fn push_front(&self, key: &str, value: &[u8], max_len: usize) -> StoreResult<()>;

    /// Returns the full list for a key, front first.
    async fn list(&self, key: &str) -> StoreResult<Vec<Vec<u8>>>;
}
