use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("block {index} defines data without a hash")]
    MissingHash { index: u64 },

    #[error("block {index} has no data; placeholders cannot be stored or sent")]
    MissingData { index: u64 },
}
