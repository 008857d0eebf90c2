//! File-backed cache: one JSON document per key under a directory.
//!
//! Writes go to a temp file first and are renamed into place, so readers never
//! see a half-written entry. Survives restarts, which is what keeps LLM calls
//! from repeating across daily runs.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::debug;

use super::{CacheEntry, CacheError, CacheStore};

pub const DEFAULT_CACHE_DIR: &str = "cache/relevance";
/// Temp files older than this are leftovers from an interrupted write.
pub const STALE_TMP_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    tmp_seq: AtomicU64,
    stale_tmp_age: Duration,
}

impl FileCache {
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_seq: AtomicU64::new(0),
            stale_tmp_age: STALE_TMP_AGE,
        }
    }

    /// Age after which `purge_expired` deletes orphaned `.tmp` files.
    pub fn with_stale_tmp_age(mut self, age: Duration) -> Self {
        self.stale_tmp_age = age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    async fn is_stale_tmp(&self, item: &fs::DirEntry) -> bool {
        let age = match item.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
            Err(_) => return false,
        };
        age >= self.stale_tmp_age
    }

    async fn read_entry(path: &Path) -> Result<Option<CacheEntry<String>>, CacheError> {
        match fs::read_to_string(path).await {
            Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keys are `namespace:hex`; anything outside `[A-Za-z0-9_-]` maps to `_`.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(target: "relevance", path = %path.display(), error = %e, "could not remove cache file");
        }
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<String>>, CacheError> {
        let path = self.entry_path(key);
        match Self::read_entry(&path).await? {
            Some(entry) if entry.is_expired() => {
                remove_quietly(&path).await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;
        let entry = CacheEntry::new(key, value, ttl);
        let json = serde_json::to_string(&entry)?;

        let path = self.entry_path(key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));
        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            remove_quietly(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => {}
                Some("tmp") => {
                    if self.is_stale_tmp(&item).await {
                        remove_quietly(&path).await;
                        removed += 1;
                    }
                    continue;
                }
                _ => continue,
            }
            // Unreadable or corrupt files are dropped as well.
            let expired = match Self::read_entry(&path).await {
                Ok(Some(entry)) => entry.is_expired_at(now),
                Ok(None) => false,
                Err(_) => true,
            };
            if expired {
                remove_quietly(&path).await;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
