/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored value is malformed or does not match its key.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The key cannot be mapped onto the backend.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
