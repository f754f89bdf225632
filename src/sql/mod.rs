//! Outbound statement handling for relaxed-isolation reads.

mod error;
mod isolation;
mod lexer;
mod rewriter;

pub use error::RewriteError;
pub use isolation::{PassThrough, RelaxedReads, SET_READ_UNCOMMITTED, StatementInterceptor};
pub use rewriter::{
    FORCE_ALL_MARKER, METRIC_SQL_REWRITE_TOTAL, NOLOCK_HINT, QueryRewriter, RewriteDecision,
};
