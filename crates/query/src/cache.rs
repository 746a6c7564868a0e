//! Tag-aware cache backend.
//!
//! Entries carry tags alongside their payload so that a whole family of
//! keys ("everything derived from pricing data") can be dropped in one
//! call after a catalog rewrite, without tracking individual keys.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Errors from a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The serialized payload exceeds the per-entry admission budget.
    /// Callers treat this as a miss and serve the source value directly.
    #[error("cache entry of {size} bytes exceeds the {limit} byte limit")]
    SizeLimit { size: usize, limit: usize },

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value cache with per-entry tags and TTL expiry.
#[async_trait]
pub trait TagCache: Send + Sync {
    /// Returns the stored payload for `key`, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` with the given tags.
    ///
    /// # Errors
    /// Returns `CacheError::SizeLimit` when the payload exceeds the
    /// admission budget; the entry is not stored.
    async fn set(
        &self,
        key: &str,
        value: String,
        tags: &[&str],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drops every entry carrying `tag`. Returns the number removed.
    async fn invalidate_tag(&self, tag: &str) -> u64;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    tags: Vec<String>,
    expires_at: Instant,
}

/// In-process `TagCache` backed by a `HashMap` behind an async lock.
///
/// Expiry is lazy: stale entries are dropped when read, not by a sweeper.
#[derive(Debug, Clone)]
pub struct MemoryTagCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    max_entry_bytes: usize,
}

impl MemoryTagCache {
    #[must_use]
    pub fn new(max_entry_bytes: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entry_bytes,
        }
    }

    /// Number of live entries, for tests and diagnostics.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TagCache for MemoryTagCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired; upgrade to a write lock and remove if still stale.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= now {
                entries.remove(key);
            }
        }
        None
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        tags: &[&str],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let size = value.len();
        if size > self.max_entry_bytes {
            return Err(CacheError::SizeLimit {
                size,
                limit: self.max_entry_bytes,
            });
        }

        let entry = Entry {
            value,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> u64 {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        (before - entries.len()) as u64
    }
}
