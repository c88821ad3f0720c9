//! Response caching keyed by request fingerprints.

use super::{NormalizedRequest, SearchResponse};
use crate::error::CacheError;
use async_trait::async_trait;
use serde::Serialize;
use moka::sync::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

const KEY_PREFIX: &str = "search:";

/// Canonical form of the cache-relevant request fields.
#[derive(Serialize)]
struct FingerprintFields<'a> {
    query: &'a str,
    databases: Vec<&'a str>,
    tables: Vec<&'a str>,
    columns: Vec<&'a str>,
    mode: &'a str,
    limit: u32,
    offset: u32,
}

/// Derive the cache key for a normalized request.
///
/// Database, table and column order do not affect the key; the mode is
/// already case-folded by normalization.
pub fn fingerprint(request: &NormalizedRequest) -> String {
    let fields = FingerprintFields {
        query: &request.query,
        databases: sorted(&request.databases),
        tables: sorted(&request.tables),
        columns: sorted(&request.columns),
        mode: request.mode.as_str(),
        limit: request.limit,
        offset: request.offset,
    };

    // Serializing borrowed strings and integers cannot fail.
    let canonical = serde_json::to_string(&fields).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}{}", KEY_PREFIX, hex::encode(digest))
}

fn sorted(items: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = items.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

/// Storage for cached responses.
///
/// Implementations handle their own concurrency. The orchestrator treats
/// every error as a miss (read) or a no-op (write).
#[async_trait]
pub trait SearchCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SearchResponse>, CacheError>;
    async fn set(&self, key: &str, value: &SearchResponse, ttl: Duration)
        -> Result<(), CacheError>;
}

/// Longest lifetime a cached response may have. Longer TTLs are clamped.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(crate::config::MAX_CACHE_TTL_SECS);

#[derive(Clone)]
struct CacheSlot {
    ttl: Duration,
    value: Arc<SearchResponse>,
}

/// Expires each slot after the TTL it was stored with.
struct SlotExpiry;

impl Expiry<String, CacheSlot> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &CacheSlot,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }
}

/// In-process cache with per-entry TTL and a capacity bound.
pub struct MemoryCache {
    entries: Cache<String, CacheSlot>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries.max(1) as u64)
            .expire_after(SlotExpiry)
            .build();
        Self { entries }
    }

    /// Number of live entries, after pending evictions are applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_MAX_ENTRIES)
    }
}

#[async_trait]
impl SearchCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<SearchResponse>, CacheError> {
        Ok(self
            .entries
            .get(key)
            .map(|slot| slot.value.as_ref().clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &SearchResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let slot = CacheSlot {
            ttl: ttl.min(MAX_CACHE_TTL),
            value: Arc::new(value.clone()),
        };
        self.entries.insert(key.to_string(), slot);
        Ok(())
    }
}
