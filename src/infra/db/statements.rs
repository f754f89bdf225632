//! SQL text generation for table-backed entities.
//!
//! Statements use positional `$n` placeholders; the values travel alongside
//! in the same order. Filter columns are checked against the table's column
//! list so no caller-supplied text reaches the statement.

use crate::application::repos::{Filter, FieldValue, RepoError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub id_column: &'static str,
    /// Writable columns, in bind order.
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<FieldValue>,
}

impl TableSpec {
    fn projection(&self) -> String {
        std::iter::once(self.id_column)
            .chain(self.columns.iter().copied())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn knows(&self, column: &str) -> bool {
        column == self.id_column || self.columns.contains(&column)
    }

    fn where_clause(&self, filter: &Filter, params: &mut Vec<FieldValue>) -> Result<String, RepoError> {
        let mut parts = Vec::with_capacity(filter.conditions().len());
        for condition in filter.conditions() {
            if !self.knows(&condition.column) {
                return Err(RepoError::invalid_input(format!(
                    "unknown column `{}` for table `{}`",
                    condition.column, self.table
                )));
            }
            params.push(condition.value.clone());
            parts.push(format!(
                "{} {} ${}",
                condition.column,
                condition.op.as_sql(),
                params.len()
            ));
        }
        if parts.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", parts.join(" AND ")))
        }
    }

    pub fn select(&self, filter: &Filter) -> Result<Statement, RepoError> {
        let mut params = Vec::new();
        let clause = self.where_clause(filter, &mut params)?;
        Ok(Statement {
            text: format!(
                "SELECT {} FROM {}{} ORDER BY {}",
                self.projection(),
                self.table,
                clause,
                self.id_column
            ),
            params,
        })
    }

    pub fn select_by_id(&self, id: i64) -> Statement {
        Statement {
            text: format!(
                "SELECT {} FROM {} WHERE {} = $1",
                self.projection(),
                self.table,
                self.id_column
            ),
            params: vec![FieldValue::Int(id)],
        }
    }

    pub fn exists(&self, filter: &Filter) -> Result<Statement, RepoError> {
        let mut params = Vec::new();
        let clause = self.where_clause(filter, &mut params)?;
        Ok(Statement {
            text: format!("SELECT EXISTS (SELECT 1 FROM {}{})", self.table, clause),
            params,
        })
    }

    pub fn insert(&self, values: Vec<FieldValue>) -> Result<Statement, RepoError> {
        self.check_arity(&values)?;
        let placeholders: Vec<String> = (1..=values.len()).map(|n| format!("${n}")).collect();
        Ok(Statement {
            text: format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                self.table,
                self.columns.join(", "),
                placeholders.join(", "),
                self.projection()
            ),
            params: values,
        })
    }

    pub fn update(&self, id: i64, mut values: Vec<FieldValue>) -> Result<Statement, RepoError> {
        self.check_arity(&values)?;
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ${}", index + 1))
            .collect();
        values.push(FieldValue::Int(id));
        Ok(Statement {
            text: format!(
                "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
                self.table,
                assignments.join(", "),
                self.id_column,
                values.len(),
                self.projection()
            ),
            params: values,
        })
    }

    pub fn delete(&self, id: i64) -> Statement {
        Statement {
            text: format!("DELETE FROM {} WHERE {} = $1", self.table, self.id_column),
            params: vec![FieldValue::Int(id)],
        }
    }

    fn check_arity(&self, values: &[FieldValue]) -> Result<(), RepoError> {
        if values.len() == self.columns.len() {
            Ok(())
        } else {
            Err(RepoError::invalid_input(format!(
                "table `{}` expects {} values, got {}",
                self.table,
                self.columns.len(),
                values.len()
            )))
        }
    }
}
