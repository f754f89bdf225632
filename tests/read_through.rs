use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ppreporter_cache::application::repos::{Entity, Filter, RepoError};
use ppreporter_cache::application::repository::CachingRepository;
use ppreporter_cache::cache::{CacheBackend, CacheConfig, CacheError, CacheKey, CacheStore};
use ppreporter_cache::domain::{Currency, WhiteLabel};
use ppreporter_cache::infra::memory::MemoryStore;
use tokio_util::sync::CancellationToken;

fn white_label(id: i64, name: &str, is_active: bool) -> WhiteLabel {
    WhiteLabel {
        id,
        name: name.to_string(),
        code: name.to_ascii_uppercase(),
        is_active,
    }
}

fn seeded_store() -> Arc<MemoryStore<WhiteLabel>> {
    Arc::new(MemoryStore::with_rows([
        white_label(1, "alpha", true),
        white_label(2, "beta", false),
        white_label(3, "gamma", true),
    ]))
}

fn repository(
    store: &Arc<MemoryStore<WhiteLabel>>,
    config: CacheConfig,
) -> CachingRepository<WhiteLabel, MemoryStore<WhiteLabel>> {
    CachingRepository::new(
        Arc::clone(store),
        Arc::new(CacheStore::in_memory(config)),
    )
}

/// Backend that fails every call, standing in for an unreachable cache server.
struct UnreachableBackend;

#[async_trait]
impl CacheBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::backend("get", "connection refused"))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::backend("set", "connection refused"))
    }

    async fn remove(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::backend("remove", "connection refused"))
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::backend("exists", "connection refused"))
    }
}

#[tokio::test]
async fn repeated_reads_are_served_from_cache() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());

    let first = repo.get_all(false).await.expect("first read");
    let second = repo.get_all(false).await.expect("second read");

    assert_eq!(first, second);
    assert_eq!(
        first.iter().map(|row| row.id).collect::<Vec<_>>(),
        vec![1, 3]
    );
    assert_eq!(store.calls().fetch, 1);

    let stats = repo.cache().statistics();
    assert_eq!((stats.hits, stats.misses), (1, 1));
    assert_eq!(stats.item_count, 1);
}

#[tokio::test]
async fn active_and_inactive_listings_are_cached_separately() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());

    assert_eq!(repo.get_all(false).await.unwrap().len(), 2);
    assert_eq!(repo.get_all(true).await.unwrap().len(), 3);
    assert_eq!(repo.get_all(true).await.unwrap().len(), 3);

    assert_eq!(store.calls().fetch, 2);
    assert_eq!(
        repo.cache().keys(),
        vec![
            "WhiteLabel_All_false".to_string(),
            "WhiteLabel_All_true".to_string()
        ]
    );
}

#[tokio::test]
async fn lookups_by_id_name_and_status_share_the_cache() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());

    let by_id = repo.get_by_id(3).await.unwrap();
    assert_eq!(by_id.map(|row| row.name), Some("gamma".to_string()));
    repo.get_by_id(3).await.unwrap();
    assert_eq!(store.calls().fetch_by_id, 1);

    let by_name = repo.get_by_name("beta").await.unwrap();
    assert_eq!(by_name.map(|row| row.id), Some(2));
    repo.get_by_name("beta").await.unwrap();

    let inactive = repo.get_by_active_status(false).await.unwrap();
    assert_eq!(inactive.iter().map(|row| row.id).collect::<Vec<_>>(), vec![2]);
    repo.get_by_active_status(false).await.unwrap();

    assert_eq!(store.calls().fetch, 2);
    assert!(
        repo.cache()
            .contains(&CacheKey::by_name(WhiteLabel::TYPE_NAME, "beta"))
            .await
    );
}

#[tokio::test]
async fn absent_rows_are_not_cached_by_default() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());

    assert_eq!(repo.get_by_id(42).await.unwrap(), None);
    assert_eq!(repo.get_by_id(42).await.unwrap(), None);

    assert_eq!(store.calls().fetch_by_id, 2);
    assert!(repo.cache().keys().is_empty());
}

#[tokio::test]
async fn negative_ttl_caches_absent_rows() {
    let store = seeded_store();
    let repo = repository(
        &store,
        CacheConfig {
            negative_ttl_seconds: 60,
            ..CacheConfig::default()
        },
    );

    assert_eq!(repo.get_by_id(42).await.unwrap(), None);
    assert_eq!(repo.get_by_id(42).await.unwrap(), None);

    assert_eq!(store.calls().fetch_by_id, 1);
}

#[tokio::test]
async fn store_failures_propagate_and_nothing_is_cached() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());

    store.set_unavailable(true);
    let err = repo.get_all(false).await.expect_err("store is down");
    assert!(matches!(err, RepoError::Persistence(_)));
    assert!(repo.cache().keys().is_empty());

    store.set_unavailable(false);
    assert_eq!(repo.get_all(false).await.unwrap().len(), 2);
    assert_eq!(store.calls().fetch, 2);
}

#[tokio::test]
async fn unreachable_cache_backend_degrades_to_store_reads() {
    let store = seeded_store();
    let cache = Arc::new(CacheStore::new(
        CacheConfig::default(),
        Arc::new(UnreachableBackend),
    ));
    let repo = CachingRepository::new(Arc::clone(&store), cache);

    for _ in 0..3 {
        assert_eq!(repo.get_all(false).await.unwrap().len(), 2);
    }

    assert_eq!(store.calls().fetch, 3);
    assert!(repo.cache().keys().is_empty());

    let updated = repo
        .update(&white_label(1, "alpha-prime", true))
        .await
        .expect("write succeeds while the cache is down");
    assert_eq!(updated.name, "alpha-prime");
}

#[tokio::test]
async fn disabled_cache_reads_through_every_time() {
    let store = seeded_store();
    let repo = repository(
        &store,
        CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        },
    );

    repo.get_all(false).await.unwrap();
    repo.get_all(false).await.unwrap();

    assert_eq!(store.calls().fetch, 2);
    assert_eq!(repo.cache().statistics().item_count, 0);
}

#[tokio::test]
async fn ad_hoc_filters_bypass_the_cache() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());
    let filter = Filter::new().eq("code", "ALPHA");

    assert_eq!(repo.get_by_filter(&filter).await.unwrap().len(), 1);
    assert_eq!(repo.get_by_filter(&filter).await.unwrap().len(), 1);
    assert!(repo.any(&filter).await.unwrap());

    let calls = store.calls();
    assert_eq!((calls.fetch, calls.exists), (2, 1));
    assert!(repo.cache().keys().is_empty());
}

#[tokio::test]
async fn slices_filtered_by_differently_typed_values_are_cached_apart() {
    let store = seeded_store();
    let repo = repository(&store, CacheConfig::default());
    let ttl = Duration::from_secs(60);

    let by_text = repo
        .get_cached_slice("lookup", &Filter::new().eq("id", "1"), ttl)
        .await
        .unwrap();
    let by_int = repo
        .get_cached_slice("lookup", &Filter::new().eq("id", 1_i64), ttl)
        .await
        .unwrap();

    assert!(by_text.is_empty());
    assert_eq!(by_int.iter().map(|row| row.id).collect::<Vec<_>>(), vec![1]);
    assert_eq!(store.calls().fetch, 2);
    assert_eq!(repo.cache().keys().len(), 2);
}

#[tokio::test]
async fn cancelled_reads_fail_without_touching_the_cache() {
    let store = Arc::new(
        MemoryStore::with_rows([white_label(1, "alpha", true)])
            .with_latency(Duration::from_millis(200)),
    );
    let cancel = CancellationToken::new();
    let repo = repository(&store, CacheConfig::default()).with_cancellation(cancel.clone());

    let pending = tokio::spawn({
        let repo = repo.clone();
        async move { repo.get_all(false).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = pending.await.expect("task joins");
    assert!(matches!(result, Err(RepoError::Cancelled)));
    assert!(repo.cache().keys().is_empty());
}

#[tokio::test]
async fn entity_types_never_share_entries() {
    let cache = Arc::new(CacheStore::in_memory(CacheConfig::default()));
    let labels = CachingRepository::new(seeded_store(), Arc::clone(&cache));
    let currencies = CachingRepository::new(
        Arc::new(MemoryStore::with_rows([Currency {
            id: 1,
            code: "EUR".to_string(),
            name: "Euro".to_string(),
            symbol: "€".to_string(),
        }])),
        Arc::clone(&cache),
    );

    let label = labels.get_by_id(1).await.unwrap().expect("label");
    let currency = currencies.get_by_id(1).await.unwrap().expect("currency");

    assert_eq!(label.name, "alpha");
    assert_eq!(currency.code, "EUR");
    assert_eq!(
        cache.keys(),
        vec!["Currency_1".to_string(), "WhiteLabel_1".to_string()]
    );
    assert_eq!(cache.region_statistics("Currency").item_count, 1);
}
