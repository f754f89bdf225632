use thiserror::Error;

/// Reasons a statement could not be scanned safely for rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("unterminated string literal at byte {offset}")]
    UnterminatedLiteral { offset: usize },
    #[error("unterminated block comment at byte {offset}")]
    UnterminatedComment { offset: usize },
    #[error("unbalanced bracket identifier at byte {offset}")]
    UnbalancedBracket { offset: usize },
}
