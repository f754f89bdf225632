//! In-process [`BackingStore`].
//!
//! Keeps rows in a sorted map and renders the statement a SQL Server store
//! would issue for each call, so interceptors can be observed end to end.
//! Per-operation call counters make read-through behavior measurable.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::repos::{BackingStore, Entity, Filter, RepoError};
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::sql::{PassThrough, StatementInterceptor};

const SOURCE: &str = "infra::memory";

#[derive(Debug, Default)]
struct Counters {
    fetch: AtomicUsize,
    fetch_by_id: AtomicUsize,
    exists: AtomicUsize,
    insert: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

/// Number of calls per store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch: usize,
    pub fetch_by_id: usize,
    pub exists: usize,
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    pub fn reads(&self) -> usize {
        self.fetch + self.fetch_by_id + self.exists
    }

    pub fn writes(&self) -> usize {
        self.insert + self.update + self.delete
    }
}

pub struct MemoryStore<T> {
    rows: RwLock<BTreeMap<i64, T>>,
    interceptor: Arc<dyn StatementInterceptor>,
    statements: Mutex<Vec<String>>,
    calls: Counters,
    latency: Duration,
    unavailable: AtomicBool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            interceptor: Arc::new(PassThrough),
            statements: Mutex::new(Vec::new()),
            calls: Counters::default(),
            latency: Duration::ZERO,
            unavailable: AtomicBool::new(false),
            _entity: PhantomData,
        }
    }

    pub fn with_rows(rows: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        rw_write(&store.rows, SOURCE, "with_rows")
            .extend(rows.into_iter().map(|row| (row.id(), row)));
        store
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn StatementInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Delays every call, simulating a remote store.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// While unavailable every call fails with [`RepoError::Persistence`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            fetch: self.calls.fetch.load(Ordering::SeqCst),
            fetch_by_id: self.calls.fetch_by_id.load(Ordering::SeqCst),
            exists: self.calls.exists.load(Ordering::SeqCst),
            insert: self.calls.insert.load(Ordering::SeqCst),
            update: self.calls.update.load(Ordering::SeqCst),
            delete: self.calls.delete.load(Ordering::SeqCst),
        }
    }

    /// Statements as they left the interceptor, oldest first.
    pub fn statements(&self) -> Vec<String> {
        mutex_lock(&self.statements, SOURCE, "statements").clone()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.rows, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, counter: &AtomicUsize, statement: String) -> Result<(), RepoError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let issued = self.interceptor.intercept(&statement);
        mutex_lock(&self.statements, SOURCE, "enter").push(issued);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence(format!(
                "{} store unavailable",
                T::TYPE_NAME
            )));
        }
        Ok(())
    }

    fn table() -> String {
        format!("[dbo].[{}]", T::TYPE_NAME)
    }

    fn where_clause(filter: &Filter) -> String {
        if filter.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = filter
            .conditions()
            .iter()
            .enumerate()
            .map(|(index, condition)| {
                format!("[{}] {} @p{index}", condition.column, condition.op.as_sql())
            })
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }
}

#[async_trait]
impl<T: Entity> BackingStore<T> for MemoryStore<T> {
    async fn fetch(&self, filter: &Filter) -> Result<Vec<T>, RepoError> {
        let statement = format!("SELECT * FROM {}{}", Self::table(), Self::where_clause(filter));
        self.enter(&self.calls.fetch, statement).await?;
        Ok(rw_read(&self.rows, SOURCE, "fetch")
            .values()
            .filter(|row| filter.matches(*row))
            .cloned()
            .collect())
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<T>, RepoError> {
        let statement = format!("SELECT TOP (1) * FROM {} WHERE [id] = @p0", Self::table());
        self.enter(&self.calls.fetch_by_id, statement).await?;
        Ok(rw_read(&self.rows, SOURCE, "fetch_by_id").get(&id).cloned())
    }

    async fn exists(&self, filter: &Filter) -> Result<bool, RepoError> {
        let statement = format!(
            "SELECT CASE WHEN EXISTS (SELECT 1 FROM {}{}) THEN 1 ELSE 0 END",
            Self::table(),
            Self::where_clause(filter)
        );
        self.enter(&self.calls.exists, statement).await?;
        Ok(rw_read(&self.rows, SOURCE, "exists")
            .values()
            .any(|row| filter.matches(row)))
    }

    async fn insert(&self, entity: &T) -> Result<T, RepoError> {
        let statement = format!("INSERT INTO {} VALUES (@p0)", Self::table());
        self.enter(&self.calls.insert, statement).await?;
        let mut rows = rw_write(&self.rows, SOURCE, "insert");
        if rows.contains_key(&entity.id()) {
            return Err(RepoError::Duplicate {
                constraint: format!("{}_pkey", T::TYPE_NAME),
            });
        }
        rows.insert(entity.id(), entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &T) -> Result<T, RepoError> {
        let statement = format!("UPDATE {} SET [row] = @p1 WHERE [id] = @p0", Self::table());
        self.enter(&self.calls.update, statement).await?;
        let mut rows = rw_write(&self.rows, SOURCE, "update");
        match rows.get_mut(&entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(entity.clone())
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        let statement = format!("DELETE FROM {} WHERE [id] = @p0", Self::table());
        self.enter(&self.calls.delete, statement).await?;
        Ok(rw_write(&self.rows, SOURCE, "delete").remove(&id).is_some())
    }
}
