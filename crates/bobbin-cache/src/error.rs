use std::sync::Arc;

use bobbin_tasks::TaskError;

/// Errors from cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The key is in none of the consulted layers.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// I/O error from a storage backend.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A layer write task panicked or was cancelled.
    #[error("cache task failed: {0}")]
    Task(#[from] TaskError),

    /// Backend-specific failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Arc::new(err))
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
