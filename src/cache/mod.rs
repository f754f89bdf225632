//! Entity cache.
//!
//! Keyed, expiring storage shared by every caching repository:
//!
//! - **Keys** are scoped by entity type, so writes can drop a whole type at once
//! - **Statistics** track hits, misses and evictions globally and per region
//! - **Backends** hold serialized payloads; the in-process one is the default
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_seconds = 1800
//! negative_ttl_seconds = 0
//! max_entries = 10000
//! sweep_interval_seconds = 60
//! ```

mod backend;
mod config;
mod error;
mod keys;
pub(crate) mod lock;
mod stats;
mod store;

pub use backend::{CacheBackend, MemoryBackend};
pub use config::CacheConfig;
pub use error::CacheError;
pub use keys::{CacheKey, OperationKind};
pub use stats::{
    ALL_REGIONS, CounterValues, METRIC_CACHE_BACKEND_ERROR_TOTAL, METRIC_CACHE_ENTRIES,
    METRIC_CACHE_EVICT_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
    StatisticsCounters, StatisticsSnapshot,
};
pub use store::{CacheEntry, CacheStore};
