//! Read-through caching over a [`BackingStore`].
//!
//! Reads consult the shared [`CacheStore`] first and fill it on a miss. Writes
//! go straight to the store and then drop every cached entry of the entity
//! type. Cache failures never surface to callers: reads fall back to the
//! store and writes still succeed. Store failures are logged and returned
//! unchanged.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::application::repos::{Activatable, BackingStore, Entity, Filter, Named, RepoError};
use crate::cache::{CacheKey, CacheStore};

pub struct CachingRepository<T, S> {
    store: Arc<S>,
    cache: Arc<CacheStore>,
    cancel: CancellationToken,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S> Clone for CachingRepository<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            cancel: self.cancel.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T, S> CachingRepository<T, S>
where
    T: Entity,
    S: BackingStore<T>,
{
    pub fn new(store: Arc<S>, cache: Arc<CacheStore>) -> Self {
        Self {
            store,
            cache,
            cancel: CancellationToken::new(),
            _entity: PhantomData,
        }
    }

    /// Scopes the repository to a request. Once `cancel` fires, pending and
    /// future store calls return [`RepoError::Cancelled`] and nothing is cached.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn get_all(&self, include_inactive: bool) -> Result<Vec<T>, RepoError> {
        let key = CacheKey::all(T::TYPE_NAME, include_inactive);
        if let Some(rows) = self.lookup::<Vec<T>>(&key).await {
            return Ok(rows);
        }

        let filter = if include_inactive {
            Filter::new()
        } else {
            T::active_filter().unwrap_or_default()
        };
        let rows = self.guarded("get_all", self.store.fetch(&filter)).await?;
        self.fill(&key, &rows, self.cache.config().default_ttl())
            .await;
        Ok(rows)
    }

    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn get_by_id(&self, id: i64) -> Result<Option<T>, RepoError> {
        let key = CacheKey::by_id(T::TYPE_NAME, id);
        if let Some(found) = self.lookup::<Option<T>>(&key).await {
            return Ok(found);
        }

        let found = self
            .guarded("get_by_id", self.store.fetch_by_id(id))
            .await?;
        self.fill_optional(&key, &found).await;
        Ok(found)
    }

    /// Ad-hoc predicates are never cached.
    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn get_by_filter(&self, filter: &Filter) -> Result<Vec<T>, RepoError> {
        self.guarded("get_by_filter", self.store.fetch(filter))
            .await
    }

    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn any(&self, filter: &Filter) -> Result<bool, RepoError> {
        self.guarded("any", self.store.exists(filter)).await
    }

    /// Caches the rows matching `filter` under a named slice with its own lifetime.
    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn get_cached_slice(
        &self,
        label: &str,
        filter: &Filter,
        ttl: Duration,
    ) -> Result<Vec<T>, RepoError> {
        let key = Self::slice_key(label, filter);
        if let Some(rows) = self.lookup::<Vec<T>>(&key).await {
            return Ok(rows);
        }

        let rows = self
            .guarded("get_cached_slice", self.store.fetch(filter))
            .await?;
        self.fill(&key, &rows, ttl).await;
        Ok(rows)
    }

    /// Drops one named slice; returns true when it was cached.
    pub async fn invalidate_slice(&self, label: &str, filter: &Filter) -> bool {
        self.cache.remove(&Self::slice_key(label, filter)).await
    }

    #[instrument(skip(self, entity), fields(entity_type = T::TYPE_NAME))]
    pub async fn add(&self, entity: &T) -> Result<T, RepoError> {
        let outcome = self.guarded("add", self.store.insert(entity)).await;
        if outcome.is_ok() || matches!(outcome, Err(RepoError::Cancelled)) {
            self.invalidate().await;
        }
        outcome
    }

    #[instrument(skip(self, entity), fields(entity_type = T::TYPE_NAME, id = entity.id()))]
    pub async fn update(&self, entity: &T) -> Result<T, RepoError> {
        let outcome = self.guarded("update", self.store.update(entity)).await;
        if outcome.is_ok() || matches!(outcome, Err(RepoError::Cancelled)) {
            self.invalidate().await;
        }
        outcome
    }

    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        let outcome = self.guarded("delete", self.store.delete(id)).await;
        if matches!(outcome, Ok(true) | Err(RepoError::Cancelled)) {
            self.invalidate().await;
        }
        outcome
    }

    /// Drops every cached entry of this entity type.
    pub async fn invalidate(&self) -> usize {
        let removed = self
            .cache
            .remove_by_prefix(&CacheKey::type_prefix(T::TYPE_NAME))
            .await;
        debug!(entity_type = T::TYPE_NAME, removed, "cache scope invalidated");
        removed
    }

    fn slice_key(label: &str, filter: &Filter) -> CacheKey {
        CacheKey::custom(T::TYPE_NAME, label, filter.key_params())
    }

    /// Races the store call against cancellation and logs failures with the
    /// caller's span, then hands the result back untouched.
    async fn guarded<V>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<V, RepoError>>,
    ) -> Result<V, RepoError> {
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RepoError::Cancelled),
            outcome = call => outcome,
        };
        match &outcome {
            Err(RepoError::Cancelled) => {
                debug!(entity_type = T::TYPE_NAME, operation, "backing store call cancelled");
            }
            Err(err) => {
                error!(
                    entity_type = T::TYPE_NAME,
                    operation,
                    error = %err,
                    "backing store call failed"
                );
            }
            Ok(_) => {}
        }
        outcome
    }

    async fn lookup<V: DeserializeOwned>(&self, key: &CacheKey) -> Option<V> {
        if !self.cache.config().enabled {
            return None;
        }
        match self.cache.try_get::<V>(key).await {
            Ok(Some(value)) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed; falling back to store");
                None
            }
        }
    }

    async fn fill<V: Serialize + ?Sized>(&self, key: &CacheKey, value: &V, ttl: Duration) {
        if !self.cache.config().enabled {
            return;
        }
        match self.cache.set(key, value, ttl).await {
            Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "cache filled"),
            Err(err) => warn!(key = %key, error = %err, "cache write failed; result served uncached"),
        }
    }

    /// Absent results are only cached when negative caching is configured.
    async fn fill_optional(&self, key: &CacheKey, found: &Option<T>) {
        let ttl = match found {
            Some(_) => Some(self.cache.config().default_ttl()),
            None => self.cache.config().negative_ttl(),
        };
        if let Some(ttl) = ttl {
            self.fill(key, found, ttl).await;
        }
    }
}

impl<T, S> CachingRepository<T, S>
where
    T: Named,
    S: BackingStore<T>,
{
    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn get_by_name(&self, name: &str) -> Result<Option<T>, RepoError> {
        let key = CacheKey::by_name(T::TYPE_NAME, name);
        if let Some(found) = self.lookup::<Option<T>>(&key).await {
            return Ok(found);
        }

        let filter = Filter::new().eq(T::NAME_COLUMN, name);
        let found = self
            .guarded("get_by_name", self.store.fetch(&filter))
            .await?
            .into_iter()
            .next();
        self.fill_optional(&key, &found).await;
        Ok(found)
    }
}

impl<T, S> CachingRepository<T, S>
where
    T: Activatable,
    S: BackingStore<T>,
{
    #[instrument(skip(self), fields(entity_type = T::TYPE_NAME))]
    pub async fn get_by_active_status(&self, active: bool) -> Result<Vec<T>, RepoError> {
        let key = CacheKey::by_active(T::TYPE_NAME, active);
        if let Some(rows) = self.lookup::<Vec<T>>(&key).await {
            return Ok(rows);
        }

        let filter = Filter::new().eq(T::ACTIVE_COLUMN, active);
        let rows = self
            .guarded("get_by_active_status", self.store.fetch(&filter))
            .await?;
        self.fill(&key, &rows, self.cache.config().default_ttl())
            .await;
        Ok(rows)
    }
}
