//! In-memory cache store
//!
//! Keys map to timestamped entries behind a `tokio::sync::RwLock`, so reads
//! run concurrently and each write replaces one key atomically.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default entry time-to-live (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached value and the instant it was written
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    pub written_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is younger than `ttl` at `now`.
    ///
    /// An entry written in the future (clock skew) counts as fresh.
    pub fn is_valid_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.written_at).to_std() {
            Ok(elapsed) => elapsed < ttl,
            Err(_) => true,
        }
    }
}

/// Generic TTL cache
pub struct Cache<T> {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry<T>>>>,
}

impl<T: Clone + Send + Sync> Cache<T> {
    /// Create a cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `entry` is still within the TTL
    pub fn is_valid(&self, entry: &CacheEntry<T>) -> bool {
        entry.is_valid_at(self.ttl, Utc::now())
    }

    /// Fresh data for `key`, or `None` when missing or expired
    pub async fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if self.is_valid(entry) => {
                tracing::debug!(key, "Cache hit");
                Some(entry.data.clone())
            }
            Some(_) => {
                tracing::debug!(key, "Cache expired");
                None
            }
            None => {
                tracing::debug!(key, "Cache miss");
                None
            }
        }
    }

    /// The last entry written for `key`, regardless of age
    pub async fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Write `data` under `key`, replacing any previous entry
    pub async fn set(&self, key: impl Into<String>, data: T) {
        let key = key.into();
        tracing::debug!(key = %key, "Cache set");
        let entry = CacheEntry {
            key: key.clone(),
            data,
            written_at: Utc::now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Drop one key
    pub async fn remove(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.write().await.remove(key)
    }

    /// Drop every key starting with `prefix`, returning how many were removed
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop everything
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T: Clone + Send + Sync> Default for Cache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
