use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::resilience::{soft_fail, soft_fail_sync};
use crate::services::recommendations::SeedSet;

pub const KEY_PREFIX: &str = "recommendations:";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend failed: {0}")]
    Backend(String),
}

/// Key-value store with per-entry expiry. Absence is never an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local store. Expired entries are dropped on read and swept when
/// the store is full.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            let evicted = self.evict_expired(now);
            tracing::debug!("Evicted {} expired cache entries", evicted);
            if self.entries.len() >= self.max_entries {
                return Err(CacheError::Backend(format!(
                    "cache is full ({} entries)",
                    self.max_entries
                )));
            }
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

/// Caching disabled: every read misses and writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait::async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Best-effort cache of computed recommendation results.
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Deterministic key for a subject and its normalized seeds. Seed order
    /// does not matter.
    pub fn key(subject_id: &str, seeds: &SeedSet) -> String {
        let sorted = |values: &[String]| {
            let mut values = values.to_vec();
            values.sort();
            values.join(",")
        };

        let mut hasher = Sha256::new();
        for part in [
            subject_id.to_string(),
            seeds.seed_kind().to_string(),
            sorted(&seeds.genres),
            sorted(&seeds.artist_ids),
            sorted(&seeds.track_ids),
            seeds.market.clone(),
            seeds.min_popularity.to_string(),
            seeds.time_range.to_string(),
            seeds
                .released_after
                .map(|date| date.to_string())
                .unwrap_or_default(),
            seeds.limit.to_string(),
        ] {
            hasher.update(part.as_bytes());
            // Separator so adjacent fields cannot run together.
            hasher.update([0u8]);
        }

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
        format!("{}{}", KEY_PREFIX, hex)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = soft_fail("cache read", self.store.get(key)).await??;
        soft_fail_sync("cache decode", serde_json::from_str(&raw))
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let Some(raw) = soft_fail_sync("cache encode", serde_json::to_string(value)) else {
            return;
        };
        soft_fail("cache write", self.store.set(key, raw, self.ttl)).await;
    }
}
