use thiserror::Error;

use crate::{application::repos::RepoError, config::LoadError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code reported by the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_)
            | AppError::Validation(_)
            | AppError::Infra(InfraError::Configuration { .. }) => 2,
            AppError::Infra(InfraError::Database { .. }) | AppError::Repo(_) => 3,
            AppError::Infra(_) | AppError::Unexpected(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_failures() {
        assert_eq!(AppError::validation("bad").exit_code(), 2);
        assert_eq!(AppError::from(RepoError::Timeout).exit_code(), 3);
        assert_eq!(AppError::from(InfraError::database("down")).exit_code(), 3);
        assert_eq!(
            AppError::from(InfraError::configuration("bad strategy")).exit_code(),
            2
        );
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }
}
