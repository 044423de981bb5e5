use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TypeError {
    #[error("failed to encode record {id}: {reason}")]
    Encode { id: String, reason: String },

    #[error("failed to decode cache entry: {0}")]
    Decode(String),
}
