//! Repository traits describing persistence adapters.

use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::Date;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// A single column value as seen by filters and statement parameters.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Bool(bool),
    Date(Date),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Date(value) => write!(f, "{value}"),
        }
    }
}

impl FieldValue {
    /// Short variant tag; keeps `Int(1)` and `Text("1")` apart in cache keys.
    pub fn type_tag(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "i",
            FieldValue::Text(_) => "s",
            FieldValue::Bool(_) => "b",
            FieldValue::Date(_) => "d",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Date> for FieldValue {
    fn from(value: Date) -> Self {
        FieldValue::Date(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, left: &FieldValue, right: &FieldValue) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: FieldValue,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}:{}",
            self.column,
            self.op.as_sql(),
            self.value.type_tag(),
            self.value
        )
    }
}

/// Conjunction of column comparisons. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        self.conditions.push(Condition {
            column: column.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.with(column, CompareOp::Eq, value)
    }

    pub fn ne(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.with(column, CompareOp::Ne, value)
    }

    pub fn lt(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.with(column, CompareOp::Lt, value)
    }

    pub fn ge(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.with(column, CompareOp::Ge, value)
    }

    /// Appends every condition of `other`.
    pub fn and(mut self, other: &Filter) -> Self {
        self.conditions.extend(other.conditions.iter().cloned());
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Rows missing a filtered column never match.
    pub fn matches<T: Entity>(&self, entity: &T) -> bool {
        self.conditions.iter().all(|condition| {
            entity
                .field(&condition.column)
                .is_some_and(|value| condition.op.holds(&value, &condition.value))
        })
    }

    /// Conditions rendered one per element in a stable order, for cache keys.
    pub fn key_params(&self) -> Vec<String> {
        let mut params: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        params.sort_unstable();
        params
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A cacheable record type.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Cache key scope and statistics region.
    const TYPE_NAME: &'static str;

    fn id(&self) -> i64;

    /// Value of `column`, or `None` when the type has no such column.
    fn field(&self, column: &str) -> Option<FieldValue>;

    /// Condition selecting active rows; applied by listings that exclude
    /// inactive rows. Types without an activity notion return `None`.
    fn active_filter() -> Option<Filter> {
        None
    }
}

pub trait Named: Entity {
    const NAME_COLUMN: &'static str = "name";

    fn name(&self) -> &str;
}

pub trait Activatable: Entity {
    const ACTIVE_COLUMN: &'static str = "is_active";

    fn is_active(&self) -> bool;
}

// ============================================================================
// Backing store
// ============================================================================

/// Authoritative persistence for one entity type.
#[async_trait]
pub trait BackingStore<T: Entity>: Send + Sync {
    /// Rows matching `filter`; an empty filter returns every row.
    async fn fetch(&self, filter: &Filter) -> Result<Vec<T>, RepoError>;

    async fn fetch_by_id(&self, id: i64) -> Result<Option<T>, RepoError>;

    async fn exists(&self, filter: &Filter) -> Result<bool, RepoError>;

    /// Persists a new row and returns it with its assigned id.
    async fn insert(&self, entity: &T) -> Result<T, RepoError>;

    async fn update(&self, entity: &T) -> Result<T, RepoError>;

    /// Returns false when no row had `id`.
    async fn delete(&self, id: i64) -> Result<bool, RepoError>;
}
