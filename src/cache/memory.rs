//! In-process cache behind a mutex.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{CacheEntry, CacheError, CacheStore};

/// TTL map with an optional entry bound. When full, expired entries go first;
/// if that frees nothing, the entry closest to expiry is evicted.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<HashMap<String, CacheEntry<String>>>,
    max_entries: Option<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Number of stored entries, expired ones included. Counts through a
    /// poisoned lock; the cache operations themselves report `Poisoned`.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_one(map: &mut HashMap<String, CacheEntry<String>>) {
        let victim = map
            .iter()
            .min_by_key(|(_, e)| {
                let exp = e.expires_at();
                (exp.is_none(), exp)
            })
            .map(|(k, _)| k.clone());
        if let Some(k) = victim {
            map.remove(&k);
        }
    }
}

fn drop_expired(map: &mut HashMap<String, CacheEntry<String>>) -> usize {
    let now = Utc::now();
    let before = map.len();
    map.retain(|_, e| !e.is_expired_at(now));
    before - map.len()
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<String>>, CacheError> {
        let mut map = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        let expired = match map.get(key) {
            Some(e) => e.is_expired(),
            None => return Ok(None),
        };
        if expired {
            map.remove(key);
            return Ok(None);
        }
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut map = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        if let Some(max) = self.max_entries {
            if !map.contains_key(key) && map.len() >= max {
                drop_expired(&mut map);
                if map.len() >= max {
                    Self::evict_one(&mut map);
                }
            }
        }
        map.insert(key.to_string(), CacheEntry::new(key, value, ttl));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut map = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(drop_expired(&mut map))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn miss_then_hit_then_overwrite() {
        let c = MemoryCache::new();
        assert!(c.get("k").await.unwrap().is_none());

        c.put("k", "uno".into(), Duration::from_secs(60)).await.unwrap();
        let e = c.get("k").await.unwrap().expect("hit");
        assert_eq!(e.value, "uno");
        assert_eq!(e.key, "k");

        c.put("k", "dos".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(c.get("k").await.unwrap().unwrap().value, "dos");
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let c = MemoryCache::new();
        c.put("k", "v".into(), Duration::from_millis(20)).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(c.get("k").await.unwrap().is_none());
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn purge_counts_removed_entries() {
        let c = MemoryCache::new();
        c.put("a", "1".into(), Duration::ZERO).await.unwrap();
        c.put("b", "2".into(), Duration::ZERO).await.unwrap();
        c.put("c", "3".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(c.purge_expired().await.unwrap(), 2);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn bound_evicts_closest_to_expiry() {
        let c = MemoryCache::with_max_entries(2);
        c.put("short", "1".into(), Duration::from_secs(10)).await.unwrap();
        c.put("long", "2".into(), Duration::from_secs(1000)).await.unwrap();
        c.put("new", "3".into(), Duration::from_secs(500)).await.unwrap();

        assert_eq!(c.len(), 2);
        assert!(c.get("short").await.unwrap().is_none());
        assert!(c.get("long").await.unwrap().is_some());
        assert!(c.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn len_sees_through_a_poisoned_lock() {
        let c = std::sync::Arc::new(MemoryCache::new());
        c.put("k", "v".into(), Duration::from_secs(60)).await.unwrap();

        let c2 = c.clone();
        let _ = std::thread::spawn(move || {
            let _guard = c2.inner.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert_eq!(c.len(), 1);
        assert!(matches!(c.get("k").await, Err(CacheError::Poisoned)));
    }

    #[tokio::test]
    async fn overwrite_at_capacity_does_not_evict() {
        let c = MemoryCache::with_max_entries(1);
        c.put("k", "1".into(), Duration::from_secs(60)).await.unwrap();
        c.put("k", "2".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(c.get("k").await.unwrap().unwrap().value, "2");
    }
}
