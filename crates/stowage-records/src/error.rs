//! Error types for record store operations.

use thiserror::Error;

/// Errors that can occur during record store operations.
///
/// `DuplicateKey`, `NotFound` and `ConcurrencyConflict` are expected
/// outcomes of optimistic concurrency and are matched on by callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A record with this key already exists.
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    /// No record with this key exists.
    #[error("record not found in {collection}: {key}")]
    NotFound { collection: String, key: String },

    /// The record's version changed since it was read.
    #[error("concurrency conflict in {collection}: {key}")]
    ConcurrencyConflict { collection: String, key: String },

    /// The backend failed for reasons unrelated to the request.
    #[error("record backend failure: {0}")]
    Backend(String),
}

impl RecordError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Convenience type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;
