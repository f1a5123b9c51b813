use std::time::Duration;

use stowage_records::RecordError;

/// Errors from lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock could not be acquired before the caller's deadline.
    #[error("timed out after {waited:?} waiting for lock on {key}")]
    Timeout { key: String, waited: Duration },

    /// Unexpected failure in the backing record store.
    #[error("lock store error: {0}")]
    Record(#[from] RecordError),
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
