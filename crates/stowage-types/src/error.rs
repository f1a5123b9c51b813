use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("content key too short: need at least {min} hex characters, got {actual}")]
    KeyTooShort { min: usize, actual: usize },

    #[error("unknown hash function: {0}")]
    UnknownHashFunction(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
