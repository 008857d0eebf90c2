//! Content-addressed key/value cache with per-entry expiry.
//!
//! Stores persist `CacheEntry<String>` (the value already serialized as JSON);
//! `get_typed` / `put_typed` add the serde layer on top. An entry whose
//! `created_at + ttl` has passed reads as a miss whether or not the backend has
//! physically dropped it yet.

pub mod file;
pub mod key;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use file::FileCache;
pub use key::{evaluation_key, summary_key, KEY_EXCERPT_CHARS};
pub use memory::MemoryCache;

/// Seven days, the window the daily report has always used.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 86_400);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, value: T, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            ttl,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// An entry whose expiry is not representable never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache (de)serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live entry for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<String>>, CacheError>;

    /// Store or overwrite `key`, restarting its expiry window.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Drop expired entries; returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheError>;

    fn backend_name(&self) -> &'static str;
}

/// Read and decode a typed value.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match store.get(key).await? {
        Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
        None => Ok(None),
    }
}

/// Encode and store a typed value.
pub async fn put_typed<T: Serialize + Sync>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    store.put(key, raw, ttl).await
}
