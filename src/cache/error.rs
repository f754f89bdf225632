use thiserror::Error;

/// Failures raised by the cache layer.
///
/// None of these ever reach repository callers: repositories log them and
/// fall back to the backing store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend `{op}` failed: {message}")]
    Backend { op: &'static str, message: String },
    #[error("failed to serialize value for `{key}`")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cached value for `{key}` could not be decoded")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            op,
            message: message.into(),
        }
    }
}
