//! Byte-level cache backends.
//!
//! A backend only stores opaque payloads with a lifetime. Key bookkeeping,
//! statistics and serialization live in [`super::CacheStore`], so a backend can
//! be swapped for a distributed one without touching repository code.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::error::CacheError;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Returns true when a value was present.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    payload: Bytes,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local backend on a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: DashMap<String, StoredValue>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        if let Some(value) = self.values.get(key)
            && value.is_live(now)
        {
            return Ok(Some(value.payload.clone()));
        }
        self.values.remove_if(key, |_, value| !value.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::backend("set", format!("ttl {ttl:?} overflows the clock")))?;
        self.values.insert(
            key.to_owned(),
            StoredValue {
                payload: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.values.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .values
            .get(key)
            .is_some_and(|value| value.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_returns_payloads() {
        let backend = MemoryBackend::new();
        backend
            .set("Game_1", Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            backend.get("Game_1").await.unwrap(),
            Some(Bytes::from_static(b"{}"))
        );
        assert!(backend.exists("Game_1").await.unwrap());
        assert!(backend.remove("Game_1").await.unwrap());
        assert!(!backend.remove("Game_1").await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn expired_payloads_are_dropped_on_read() {
        let backend = MemoryBackend::new();
        backend
            .set("Game_1", Bytes::from_static(b"1"), Duration::ZERO)
            .await
            .unwrap();

        assert!(!backend.exists("Game_1").await.unwrap());
        assert_eq!(backend.get("Game_1").await.unwrap(), None);
        assert_eq!(backend.len(), 0);
    }
}
