//! Postgres-backed store implementation.

mod statements;
mod tables;
mod util;

pub use statements::{Statement, TableSpec};
pub use tables::TableEntity;
pub use util::map_sqlx_error;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Postgres,
    postgres::{PgPool, PgPoolOptions},
};
use tracing::trace;

use crate::application::repos::{BackingStore, FieldValue, Filter, RepoError};
use crate::infra::error::InfraError;
use crate::sql::{RelaxedReads, SET_READ_UNCOMMITTED, StatementInterceptor};

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

/// Postgres has no table hints, so relaxed reads are session-level or off.
pub fn ensure_supported(strategy: RelaxedReads) -> Result<(), InfraError> {
    match strategy {
        RelaxedReads::StatementHints => Err(InfraError::configuration(format!(
            "isolation.strategy `{strategy}` is not supported by the Postgres store (use session or off)"
        ))),
        RelaxedReads::Session | RelaxedReads::Off => Ok(()),
    }
}

/// Binds each value in order onto a sqlx query builder.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for value in $params {
            query = match value {
                FieldValue::Int(value) => query.bind(value),
                FieldValue::Text(value) => query.bind(value),
                FieldValue::Bool(value) => query.bind(value),
                FieldValue::Date(value) => query.bind(value),
            };
        }
        query
    }};
}

/// One table behind the [`BackingStore`] boundary.
///
/// Every outbound statement passes through the interceptor. Reads additionally
/// run at READ UNCOMMITTED when the strategy asks for session isolation.
pub struct PgStore<T> {
    pool: PgPool,
    strategy: RelaxedReads,
    interceptor: Arc<dyn StatementInterceptor>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: TableEntity> PgStore<T> {
    pub fn new(pool: PgPool, strategy: RelaxedReads) -> Result<Self, InfraError> {
        ensure_supported(strategy)?;
        Ok(Self {
            pool,
            strategy,
            interceptor: strategy.interceptor(),
            _entity: PhantomData,
        })
    }

    pub fn strategy(&self) -> RelaxedReads {
        self.strategy
    }

    fn prepare(&self, statement: &Statement) -> String {
        let text = self.interceptor.intercept(&statement.text);
        trace!(table = T::TABLE, statement = %text, "outbound statement");
        text
    }

    async fn read_rows(&self, statement: Statement) -> Result<Vec<T>, RepoError> {
        let text = self.prepare(&statement);
        let query = bind_params!(
            sqlx::query_as::<Postgres, T::Row>(&text),
            statement.params
        );

        let rows = if self.strategy.uses_session_isolation() {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            sqlx::query(SET_READ_UNCOMMITTED)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            let rows = query.fetch_all(&mut *tx).await.map_err(map_sqlx_error)?;
            tx.commit().await.map_err(map_sqlx_error)?;
            rows
        } else {
            query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn read_flag(&self, statement: Statement) -> Result<bool, RepoError> {
        let text = self.prepare(&statement);
        let query = bind_params!(
            sqlx::query_scalar::<Postgres, bool>(&text),
            statement.params
        );

        if self.strategy.uses_session_isolation() {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            sqlx::query(SET_READ_UNCOMMITTED)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            let flag = query.fetch_one(&mut *tx).await.map_err(map_sqlx_error)?;
            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(flag)
        } else {
            query.fetch_one(&self.pool).await.map_err(map_sqlx_error)
        }
    }

    async fn write_row(&self, statement: Statement) -> Result<Option<T>, RepoError> {
        let text = self.prepare(&statement);
        let row = bind_params!(
            sqlx::query_as::<Postgres, T::Row>(&text),
            statement.params
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl<T: TableEntity> BackingStore<T> for PgStore<T> {
    async fn fetch(&self, filter: &Filter) -> Result<Vec<T>, RepoError> {
        self.read_rows(T::spec().select(filter)?).await
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<T>, RepoError> {
        Ok(self
            .read_rows(T::spec().select_by_id(id))
            .await?
            .into_iter()
            .next())
    }

    async fn exists(&self, filter: &Filter) -> Result<bool, RepoError> {
        self.read_flag(T::spec().exists(filter)?).await
    }

    async fn insert(&self, entity: &T) -> Result<T, RepoError> {
        self.write_row(T::spec().insert(entity.values())?)
            .await?
            .ok_or_else(|| RepoError::from_persistence("insert returned no row"))
    }

    async fn update(&self, entity: &T) -> Result<T, RepoError> {
        self.write_row(T::spec().update(entity.id(), entity.values())?)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        let statement = T::spec().delete(id);
        let text = self.prepare(&statement);
        let result = bind_params!(sqlx::query::<Postgres>(&text), statement.params)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Country;

    #[tokio::test]
    async fn statement_hints_are_rejected_for_postgres() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ppreporter")
            .expect("lazy pool does not connect");

        let err = PgStore::<Country>::new(pool.clone(), RelaxedReads::StatementHints)
            .err()
            .expect("hints strategy rejected");
        assert!(matches!(err, InfraError::Configuration { .. }));
        assert!(err.to_string().contains("statement_hints"));

        let store = PgStore::<Country>::new(pool.clone(), RelaxedReads::Session).expect("session");
        assert!(store.strategy().uses_session_isolation());
        assert!(PgStore::<Country>::new(pool, RelaxedReads::Off).is_ok());
    }
}
