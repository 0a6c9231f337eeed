//! Process-local cache with per-entry expiry.

use super::cache::Cache;
use super::error::CacheResult;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    json: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct InMemoryCache<T> {
    entries: RwLock<HashMap<String, Entry>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for InMemoryCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<T> InMemoryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }
}

#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for InMemoryCache<T> {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(serde_json::from_str(&entry.json)?)),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        entries.insert(key.to_string(), Entry { json, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .map_or(false, |e| e.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_round_trip_until_deleted() {
        let cache: InMemoryCache<String> = InMemoryCache::new();
        cache.set("k", &"RCP_1".to_string(), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("RCP_1"));
        assert!(cache.exists("k").await.unwrap());
        assert!(cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache: InMemoryCache<String> = InMemoryCache::new();
        cache
            .set("k", &"v".to_string(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.len().await, 0);
    }
}
