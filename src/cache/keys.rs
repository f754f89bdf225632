//! Cache key definitions.
//!
//! Every key is scoped by the entity type name, so a whole type can be dropped
//! with one prefix removal. Parameters are rendered verbatim (escaped), never
//! hashed, which keeps distinct queries on distinct keys.

use std::fmt;

/// The query shape a cached value answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Full listing, with or without inactive rows.
    All { include_inactive: bool },
    /// Single entity by primary key.
    ById(i64),
    /// First entity with the given name.
    ByName(String),
    /// Entities filtered on their active flag.
    ByActive(bool),
    /// A named slice with caller-supplied parameters.
    Custom { label: String, params: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    type_name: &'static str,
    kind: OperationKind,
}

impl CacheKey {
    pub fn new(type_name: &'static str, kind: OperationKind) -> Self {
        Self { type_name, kind }
    }

    pub fn all(type_name: &'static str, include_inactive: bool) -> Self {
        Self::new(type_name, OperationKind::All { include_inactive })
    }

    pub fn by_id(type_name: &'static str, id: i64) -> Self {
        Self::new(type_name, OperationKind::ById(id))
    }

    pub fn by_name(type_name: &'static str, name: &str) -> Self {
        Self::new(type_name, OperationKind::ByName(name.to_owned()))
    }

    pub fn by_active(type_name: &'static str, active: bool) -> Self {
        Self::new(type_name, OperationKind::ByActive(active))
    }

    pub fn custom<I, P>(type_name: &'static str, label: &str, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: fmt::Display,
    {
        Self::new(
            type_name,
            OperationKind::Custom {
                label: label.to_owned(),
                params: params.into_iter().map(|p| p.to_string()).collect(),
            },
        )
    }

    /// Prefix shared by every key of `type_name`.
    pub fn type_prefix(type_name: &str) -> String {
        format!("{type_name}_")
    }

    /// Statistics region of the key.
    pub fn region(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.type_name;
        match &self.kind {
            OperationKind::All { include_inactive } => write!(f, "{ty}_All_{include_inactive}"),
            OperationKind::ById(id) => write!(f, "{ty}_{id}"),
            OperationKind::ByName(name) => write!(f, "{ty}_ByName_{}", escape(name)),
            OperationKind::ByActive(active) => write!(f, "{ty}_Active_{active}"),
            OperationKind::Custom { label, params } => {
                write!(f, "{ty}_Custom_{}", escape(label))?;
                for param in params {
                    write!(f, "_{}", escape(param))?;
                }
                Ok(())
            }
        }
    }
}

/// Escapes the segment separator so free-form text cannot forge another key.
fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
    out
}
