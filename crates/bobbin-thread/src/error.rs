use bobbin_cache::CacheError;
use bobbin_remote::RemoteError;
use bobbin_tasks::TaskError;
use bobbin_types::{RecordId, TypeError};

/// Errors from resolving a thread.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ThreadError {
    /// The chain reached its root without passing the requested head.
    #[error("thread ended before reaching head {0}")]
    MismatchedHead(RecordId),

    /// The chain led back to a record already visited in this walk.
    #[error("reply chain loops back to {0}")]
    Cycle(RecordId),

    #[error("remote source error: {0}")]
    Remote(#[from] RemoteError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("cache entry error: {0}")]
    Codec(#[from] TypeError),

    #[error("thread task failed: {0}")]
    Task(#[from] TaskError),
}

pub type ThreadResult<T> = Result<T, ThreadError>;
