//! Storage error types.

use thiserror::Error;

/// Object storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("tag limit exceeded: {count} tags (max {max})")]
    TagLimitExceeded { count: usize, max: usize },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
