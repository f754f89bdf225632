//! Relaxed-isolation strategy for reads.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use super::rewriter::QueryRewriter;

/// Session-level alternative to statement hints.
pub const SET_READ_UNCOMMITTED: &str = "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED";

/// Hook invoked with every outbound statement text before execution.
pub trait StatementInterceptor: Send + Sync {
    fn intercept(&self, statement: &str) -> String;
}

/// Leaves statements untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl StatementInterceptor for PassThrough {
    fn intercept(&self, statement: &str) -> String {
        statement.to_owned()
    }
}

/// How reads avoid blocking on concurrent writers. Writes are never affected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxedReads {
    /// Rewrite each read statement with table hints.
    StatementHints,
    /// Run each read in a transaction at READ UNCOMMITTED.
    #[default]
    Session,
    /// Execute reads as issued.
    Off,
}

impl RelaxedReads {
    /// Interceptor to install on a store using this strategy.
    pub fn interceptor(self) -> Arc<dyn StatementInterceptor> {
        match self {
            RelaxedReads::StatementHints => Arc::new(QueryRewriter::new()),
            RelaxedReads::Session | RelaxedReads::Off => Arc::new(PassThrough),
        }
    }

    pub fn uses_session_isolation(self) -> bool {
        matches!(self, RelaxedReads::Session)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelaxedReads::StatementHints => "statement_hints",
            RelaxedReads::Session => "session",
            RelaxedReads::Off => "off",
        }
    }
}

impl fmt::Display for RelaxedReads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelaxedReads {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "statement_hints" | "hints" | "nolock" => Ok(RelaxedReads::StatementHints),
            "session" | "read_uncommitted" => Ok(RelaxedReads::Session),
            "off" | "none" => Ok(RelaxedReads::Off),
            other => Err(format!(
                "unknown isolation strategy `{other}` (expected statement_hints, session or off)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_names() {
        assert_eq!("statement_hints".parse(), Ok(RelaxedReads::StatementHints));
        assert_eq!(" Session ".parse(), Ok(RelaxedReads::Session));
        assert_eq!("OFF".parse(), Ok(RelaxedReads::Off));
        assert!("serializable".parse::<RelaxedReads>().is_err());
    }

    #[test]
    fn only_statement_hints_rewrites_text() {
        let sql = "SELECT * FROM Games";
        assert_eq!(
            RelaxedReads::StatementHints.interceptor().intercept(sql),
            "SELECT * FROM Games WITH (NOLOCK)"
        );
        assert_eq!(RelaxedReads::Session.interceptor().intercept(sql), sql);
        assert_eq!(RelaxedReads::Off.interceptor().intercept(sql), sql);
        assert!(RelaxedReads::Session.uses_session_isolation());
    }
}
