use bobbin_tasks::TaskError;
use bobbin_types::RecordId;

/// Errors from a remote record source.
///
/// `Clone` so that one failed fetch can be reported to every caller that
/// was attached to it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("rate limited by remote source")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(String),

    /// The shared or gated call itself was cancelled or panicked.
    #[error("remote call failed: {0}")]
    Task(#[from] TaskError),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
