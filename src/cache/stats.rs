//! Hit, miss and eviction accounting.
//!
//! Counters are kept globally and per region (the entity type name). Every
//! increment is also forwarded to the `metrics` facade.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::stats";

/// Region name reported by the global snapshot.
pub const ALL_REGIONS: &str = "all";

pub const METRIC_CACHE_HIT_TOTAL: &str = "ppreporter_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "ppreporter_cache_miss_total";
pub const METRIC_CACHE_EVICT_TOTAL: &str = "ppreporter_cache_evict_total";
pub const METRIC_CACHE_BACKEND_ERROR_TOTAL: &str = "ppreporter_cache_backend_error_total";
pub const METRIC_CACHE_ENTRIES: &str = "ppreporter_cache_entries";

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn values(&self) -> CounterValues {
        CounterValues {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn zero(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of one counter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CounterValues {
    /// hits / (hits + misses), or 0 before the first request.
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.hits + self.misses;
        if requests == 0 {
            0.0
        } else {
            self.hits as f64 / requests as f64
        }
    }
}

/// Concurrent statistics counters shared by every cache operation.
///
/// Increments never lose updates under contention. Resets zero every region
/// and stamp a new reset time.
#[derive(Debug)]
pub struct StatisticsCounters {
    total: Counters,
    regions: DashMap<String, Counters>,
    last_reset: RwLock<OffsetDateTime>,
}

impl Default for StatisticsCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsCounters {
    pub fn new() -> Self {
        Self {
            total: Counters::default(),
            regions: DashMap::new(),
            last_reset: RwLock::new(OffsetDateTime::now_utc()),
        }
    }

    pub fn record_hit(&self, region: &str) {
        self.total.hits.fetch_add(1, Ordering::Relaxed);
        self.with_region(region, |c| c.hits.fetch_add(1, Ordering::Relaxed));
        counter!(METRIC_CACHE_HIT_TOTAL, "region" => region.to_owned()).increment(1);
    }

    pub fn record_miss(&self, region: &str) {
        self.total.misses.fetch_add(1, Ordering::Relaxed);
        self.with_region(region, |c| c.misses.fetch_add(1, Ordering::Relaxed));
        counter!(METRIC_CACHE_MISS_TOTAL, "region" => region.to_owned()).increment(1);
    }

    pub fn record_eviction(&self, region: &str) {
        self.total.evictions.fetch_add(1, Ordering::Relaxed);
        self.with_region(region, |c| c.evictions.fetch_add(1, Ordering::Relaxed));
        counter!(METRIC_CACHE_EVICT_TOTAL, "region" => region.to_owned()).increment(1);
    }

    /// Backend failures only feed the metrics facade; they are not part of a snapshot.
    pub fn record_backend_error(&self, region: &str, op: &'static str) {
        counter!(
            METRIC_CACHE_BACKEND_ERROR_TOTAL,
            "region" => region.to_owned(),
            "op" => op
        )
        .increment(1);
    }

    pub fn totals(&self) -> CounterValues {
        self.total.values()
    }

    pub fn region(&self, region: &str) -> CounterValues {
        self.regions
            .get(region)
            .map(|counters| counters.values())
            .unwrap_or_default()
    }

    pub fn last_reset(&self) -> OffsetDateTime {
        *rw_read(&self.last_reset, SOURCE, "last_reset")
    }

    pub fn reset(&self) {
        let mut stamp = rw_write(&self.last_reset, SOURCE, "reset");
        self.total.zero();
        for entry in self.regions.iter() {
            entry.value().zero();
        }
        *stamp = OffsetDateTime::now_utc();
    }

    fn with_region(&self, region: &str, apply: impl FnOnce(&Counters) -> u64) {
        if let Some(counters) = self.regions.get(region) {
            apply(&counters);
            return;
        }
        let counters = self.regions.entry(region.to_owned()).or_default();
        apply(&counters);
    }
}

/// Snapshot returned by `CacheStore::statistics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub region: String,
    pub item_count: u64,
    pub total_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_reset_time: OffsetDateTime,
}

impl StatisticsSnapshot {
    pub(crate) fn assemble(
        region: &str,
        item_count: u64,
        total_size_bytes: u64,
        counters: CounterValues,
        last_reset_time: OffsetDateTime,
    ) -> Self {
        Self {
            region: region.to_owned(),
            item_count,
            total_size_bytes,
            hits: counters.hits,
            misses: counters.misses,
            hit_ratio: counters.hit_ratio(),
            evictions: counters.evictions,
            last_reset_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn hit_ratio_is_zero_without_requests() {
        let stats = StatisticsCounters::new();
        assert_eq!(stats.totals().hit_ratio(), 0.0);
    }

    #[test]
    fn counts_are_tracked_per_region_and_globally() {
        let stats = StatisticsCounters::new();
        stats.record_hit("Game");
        stats.record_hit("Game");
        stats.record_miss("Country");
        stats.record_eviction("Game");

        assert_eq!(
            stats.totals(),
            CounterValues {
                hits: 2,
                misses: 1,
                evictions: 1
            }
        );
        assert_eq!(stats.region("Game").hits, 2);
        assert_eq!(stats.region("Country").misses, 1);
        assert_eq!(stats.region("Unknown"), CounterValues::default());
        assert!((stats.totals().hit_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_zeroes_counters_and_moves_reset_time() {
        let stats = StatisticsCounters::new();
        let before = stats.last_reset();
        stats.record_hit("Game");
        stats.record_miss("Game");

        stats.reset();

        assert_eq!(stats.totals(), CounterValues::default());
        assert_eq!(stats.region("Game"), CounterValues::default());
        assert!(stats.last_reset() >= before);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(StatisticsCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        stats.record_hit("Currency");
                        stats.record_miss("Currency");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker should finish");
        }

        assert_eq!(stats.totals().hits, 8_000);
        assert_eq!(stats.totals().misses, 8_000);
        assert_eq!(stats.region("Currency").hits, 8_000);
    }
}
