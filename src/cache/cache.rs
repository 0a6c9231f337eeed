//! Generic cache trait and Redis implementation
//!
//! Values are stored as JSON. Every Redis failure degrades to a miss so a
//! cache outage never fails a payout.

use super::{error::CacheResult, RedisPool};
use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

#[async_trait]
pub trait Cache<T: Serialize + DeserializeOwned + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<T>>;

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;
}

pub struct RedisCache {
    pool: RedisPool,
}

impl RedisCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn get_connection(&self) -> CacheResult<RedisConnection<'_>> {
        self.pool.get().await.map_err(|e| {
            warn!("Failed to get Redis connection: {}", e);
            e.into()
        })
    }
}

#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(None),
        };

        let result: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Redis GET failed for key '{}': {}", key, e);
                return Ok(None);
            }
        };

        match result {
            Some(json_str) => match serde_json::from_str::<T>(&json_str) {
                Ok(value) => {
                    debug!("Cache hit for key: {}", key);
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!("Failed to deserialize cache value for key '{}': {}", key, e);
                    Ok(None)
                }
            },
            None => {
                debug!("Cache miss for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(()),
        };

        let json_str = serde_json::to_string(value).map_err(|e| {
            warn!("Failed to serialize value for key '{}': {}", key, e);
            e
        })?;

        let written: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(key, json_str, ttl.as_secs().max(1)).await,
            None => conn.set(key, json_str).await,
        };
        if let Err(e) = written {
            warn!("Redis SET failed for key '{}': {}", key, e);
            return Ok(());
        }

        debug!("Cache set for key: {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false),
        };

        let result: i32 = conn.del(key).await.map_err(|e| {
            warn!("Redis DEL failed for key '{}': {}", key, e);
            e
        })?;
        Ok(result > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false),
        };

        let result: i32 = conn.exists(key).await.map_err(|e| {
            warn!("Redis EXISTS failed for key '{}': {}", key, e);
            e
        })?;
        Ok(result > 0)
    }
}

pub mod ttl {
    use std::time::Duration;

    /// Gateway recipient codes: 30 days
    pub const RECIPIENT_CODE: Duration = Duration::from_secs(30 * 24 * 3600);

    /// Processed webhook markers: 24 hours
    pub const WEBHOOK_EVENT: Duration = Duration::from_secs(24 * 3600);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{init_cache_pool, RedisPoolConfig};

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_basic_cache_operations() {
        let pool = init_cache_pool(RedisPoolConfig::default()).await.unwrap();
        let cache = RedisCache::new(pool);

        cache
            .set("v1:test:key", &"RCP_1".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let retrieved: Option<String> = cache.get("v1:test:key").await.unwrap();
        assert_eq!(retrieved.as_deref(), Some("RCP_1"));

        assert!(<RedisCache as Cache<String>>::delete(&cache, "v1:test:key")
            .await
            .unwrap());
        assert!(!<RedisCache as Cache<String>>::exists(&cache, "v1:test:key")
            .await
            .unwrap());
    }
}
