//! Redis-backed store implementation.
//!
//! Production implementation of [`Store`] for multi-instance
//! deployments, where counters, cooldown markers, and enforcement
//! markers must be shared between replicas with atomic
//! increment/expire semantics.
//!
//! Uses `deadpool-redis` for connection pooling. Counter windows map to
//! `INCR` + `EXPIRE`-on-create, bounded lists to `LPUSH` + `LTRIM`.

use super::{Store, StoreError, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

/// Configuration for the Redis store.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    pub url: String,
    /// Key prefix applied to every key.
    pub key_prefix: String,
}

impl RedisStoreConfig {
    /// Creates a configuration with the default `vigil` prefix.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "vigil".to_string(),
        }
    }

    /// Overrides the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// A [`Store`] backed by Redis.
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    /// Creates a store and its connection pool.
    pub fn new(config: RedisStoreConfig) -> StoreResult<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            pool,
            key_prefix: config.key_prefix,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get(self.full_key(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = self.full_key(key);
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        } else {
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .del(self.full_key(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        conn.exists(self.full_key(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let key = self.full_key(key);
        let count: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        // First increment in the window owns the expiry.
        if count == 1 && !ttl.is_zero() {
            conn.expire::<_, ()>(&key, ttl.as_secs() as i64)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(count)
    }

    async fn push_front(&self, key: &str, value: &[u8], max_len: usize) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = self.full_key(key);
        redis::pipe()
            .atomic()
            .lpush(&key, value)
            .ltrim(&key, 0, max_len.saturating_sub(1) as isize)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.lrange(self.full_key(key), 0, -1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_prefix() {
        let config = RedisStoreConfig::new("redis://localhost:6379");
        assert_eq!(config.key_prefix, "vigil");

        let config = config.with_key_prefix("vg-test");
        assert_eq!(config.key_prefix, "vg-test");
    }

    #[test]
    fn full_key_includes_prefix() {
        let store = RedisStore::new(RedisStoreConfig::new("redis://localhost:6379")).unwrap();
        assert_eq!(store.full_key("block:1.2.3.4"), "vigil:block:1.2.3.4");
    }
}
