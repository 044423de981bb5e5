use thiserror::Error;
use tokio::task::JoinError;

/// Failure of a coordinated task itself, as opposed to the work it ran.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task was cancelled before it completed")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl From<JoinError> for TaskError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            return TaskError::Cancelled;
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        TaskError::Panicked(message)
    }
}
