//! Cache configuration.
//!
//! Controls entry lifetimes and the size bound of the shared entity cache.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_NEGATIVE_TTL_SECONDS: u64 = 0;
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Cache configuration from `ppreporter.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve reads from the cache. When false every read goes to the store.
    pub enabled: bool,
    /// Lifetime of entries written by repository reads.
    pub default_ttl_seconds: u64,
    /// Lifetime of "not found" markers. Zero disables negative caching.
    pub negative_ttl_seconds: u64,
    /// Upper bound on live entries; the entry closest to expiry is evicted first.
    pub max_entries: usize,
    /// Cadence of the background sweep for expired entries.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            negative_ttl_seconds: DEFAULT_NEGATIVE_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_seconds: settings.default_ttl.as_secs(),
            negative_ttl_seconds: settings.negative_ttl.map_or(0, |ttl| ttl.as_secs()),
            max_entries: settings.max_entries.get(),
            sweep_interval_seconds: settings.sweep_interval.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Returns `None` when negative caching is disabled.
    pub fn negative_ttl(&self) -> Option<Duration> {
        (self.negative_ttl_seconds > 0).then(|| Duration::from_secs(self.negative_ttl_seconds))
    }

    /// Returns the entry bound as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Sweep cadence, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl(), Duration::from_secs(1800));
        assert_eq!(config.negative_ttl(), None);
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn negative_ttl_enabled_when_positive() {
        let config = CacheConfig {
            negative_ttl_seconds: 45,
            ..Default::default()
        };
        assert_eq!(config.negative_ttl(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            sweep_interval_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
