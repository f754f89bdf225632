//! Keyed cache store.
//!
//! Values are serialized to JSON and handed to a [`CacheBackend`]. The store
//! keeps its own index of live keys (region, size, lifetime), which is what
//! makes prefix and region removal, key listing and statistics possible on
//! top of a plain get/set backend. The index is authoritative: an entry that
//! is not indexed is never served.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::gauge;
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{CacheBackend, MemoryBackend};
use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::stats::{
    ALL_REGIONS, METRIC_CACHE_ENTRIES, StatisticsCounters, StatisticsSnapshot,
};

const SOURCE: &str = "cache::store";

/// Metadata for one cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub region: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

pub struct CacheStore {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    index: DashMap<String, CacheEntry>,
    stats: StatisticsCounters,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("entries", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            index: DashMap::new(),
            stats: StatisticsCounters::new(),
        }
    }

    /// Store backed by a process-local [`MemoryBackend`].
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryBackend::new()))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn counters(&self) -> &StatisticsCounters {
        &self.stats
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    /// Looks up `key`. Absent and expired entries are misses; expired ones are
    /// purged on the spot. A payload that fails to decode also counts as a miss.
    pub async fn try_get<V: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<V>, CacheError> {
        let rendered = key.render();
        let region = key.region();

        let now = OffsetDateTime::now_utc();
        let expired = match self.index.get(&rendered) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss(region);
                return Ok(None);
            }
        };
        if expired {
            self.evict_expired(&rendered, now).await;
            self.stats.record_miss(region);
            return Ok(None);
        }

        let payload = match self.backend.get(&rendered).await {
            Ok(payload) => payload,
            Err(err) => {
                self.stats.record_miss(region);
                self.stats.record_backend_error(region, "get");
                return Err(err);
            }
        };
        let Some(payload) = payload else {
            // The backend dropped the value on its own.
            self.index.remove(&rendered);
            self.publish_entry_gauge();
            self.stats.record_miss(region);
            return Ok(None);
        };

        match serde_json::from_slice(&payload) {
            Ok(value) => {
                self.stats.record_hit(region);
                Ok(Some(value))
            }
            Err(source) => {
                self.stats.record_miss(region);
                Err(CacheError::Deserialization {
                    key: rendered,
                    source,
                })
            }
        }
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// `max_entries` is restored after every insert. Concurrent inserts of new
    /// keys may overshoot it until each of them has trimmed.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let rendered = key.render();
        let region = key.region();
        let payload = serde_json::to_vec(value).map_err(|source| CacheError::Serialization {
            key: rendered.clone(),
            source,
        })?;
        let size_bytes = payload.len() as u64;

        if let Err(err) = self.backend.set(&rendered, Bytes::from(payload), ttl).await {
            self.stats.record_backend_error(region, "set");
            return Err(err);
        }

        let created_at = OffsetDateTime::now_utc();
        let lifetime = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        self.index.insert(
            rendered.clone(),
            CacheEntry {
                key: rendered.clone(),
                region: region.to_owned(),
                created_at,
                expires_at: created_at.saturating_add(lifetime),
                size_bytes,
            },
        );
        self.publish_entry_gauge();
        self.enforce_capacity(&rendered).await;
        Ok(())
    }

    /// True when `key` holds a live entry.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let rendered = key.render();
        let live = self
            .index
            .get(&rendered)
            .is_some_and(|entry| !entry.is_expired(OffsetDateTime::now_utc()));
        if !live {
            return false;
        }
        match self.backend.exists(&rendered).await {
            Ok(present) => present,
            Err(err) => {
                self.stats.record_backend_error(key.region(), "exists");
                warn!(key = %rendered, error = %err, "cache existence probe failed");
                false
            }
        }
    }

    /// Removes `key`; returns true when an entry was present.
    pub async fn remove(&self, key: &CacheKey) -> bool {
        self.evict(&key.render(), "removed").await
    }

    /// Removes every key starting with `prefix`; returns how many were dropped.
    pub async fn remove_by_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .index
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        self.evict_all(keys, "invalidated").await
    }

    /// Removes every entry tagged with `region`.
    pub async fn remove_by_region(&self, region: &str) -> usize {
        let keys: Vec<String> = self
            .index
            .iter()
            .filter(|entry| entry.region == region)
            .map(|entry| entry.key().clone())
            .collect();
        self.evict_all(keys, "invalidated").await
    }

    pub async fn clear(&self) -> usize {
        let keys: Vec<String> = self.index.iter().map(|entry| entry.key().clone()).collect();
        self.evict_all(keys, "cleared").await
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = OffsetDateTime::now_utc();
        let mut keys: Vec<String> = self
            .index
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.index.get(&key.render()).map(|entry| entry.clone())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn statistics(&self) -> StatisticsSnapshot {
        let (count, size) = self.live_totals(|_| true);
        StatisticsSnapshot::assemble(
            ALL_REGIONS,
            count,
            size,
            self.stats.totals(),
            self.stats.last_reset(),
        )
    }

    pub fn region_statistics(&self, region: &str) -> StatisticsSnapshot {
        let (count, size) = self.live_totals(|entry| entry.region == region);
        StatisticsSnapshot::assemble(
            region,
            count,
            size,
            self.stats.region(region),
            self.stats.last_reset(),
        )
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
        debug!(source = SOURCE, "cache statistics reset");
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Drops every expired entry; returns how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let expired: Vec<String> = self
            .index
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.evict_expired(&key, now).await {
                removed += 1;
            }
        }
        removed
    }

    /// Runs [`Self::sweep_expired`] on the configured cadence until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = store.sweep_expired().await;
                        if purged > 0 {
                            debug!(
                                target = "ppreporter::cache::sweeper",
                                purged,
                                "Swept expired cache entries"
                            );
                        }
                    }
                }
            }
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Evicts the entries closest to expiry, never `keep`, until the store
    /// is back within `max_entries`.
    async fn enforce_capacity(&self, keep: &str) {
        let bound = self.config.max_entries_non_zero().get();
        while self.index.len() > bound {
            let victim = self
                .index
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            let Some(victim) = victim else {
                break;
            };
            self.evict(&victim, "capacity").await;
        }
    }

    async fn evict_all(&self, keys: Vec<String>, reason: &'static str) -> usize {
        let mut removed = 0;
        for key in keys {
            if self.evict(&key, reason).await {
                removed += 1;
            }
        }
        removed
    }

    async fn evict(&self, key: &str, reason: &'static str) -> bool {
        self.evict_if(key, reason, |_| true).await
    }

    /// Evicts `key` only while it is still expired at `now`; an entry
    /// refreshed by a concurrent `set` stays.
    async fn evict_expired(&self, key: &str, now: OffsetDateTime) -> bool {
        self.evict_if(key, "expired", |entry| entry.is_expired(now)).await
    }

    /// Drops the index entry first so the value stops being served even when
    /// the backend call fails.
    async fn evict_if(
        &self,
        key: &str,
        reason: &'static str,
        condition: impl FnOnce(&CacheEntry) -> bool,
    ) -> bool {
        let Some((_, entry)) = self.index.remove_if(key, |_, entry| condition(entry)) else {
            return false;
        };
        if let Err(err) = self.backend.remove(key).await {
            self.stats.record_backend_error(&entry.region, "remove");
            warn!(key, region = %entry.region, error = %err, "cache backend removal failed");
        }
        self.stats.record_eviction(&entry.region);
        debug!(key, region = %entry.region, reason, "cache entry evicted");
        self.publish_entry_gauge();
        true
    }

    fn live_totals(&self, include: impl Fn(&CacheEntry) -> bool) -> (u64, u64) {
        let now = OffsetDateTime::now_utc();
        self.index
            .iter()
            .filter(|entry| !entry.is_expired(now) && include(entry.value()))
            .fold((0, 0), |(count, size), entry| {
                (count + 1, size + entry.size_bytes)
            })
    }

    fn publish_entry_gauge(&self) {
        gauge!(METRIC_CACHE_ENTRIES).set(self.index.len() as f64);
    }
}
