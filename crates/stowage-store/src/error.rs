use stowage_records::RecordError;
use stowage_types::{ContentKey, TypeError};

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The block exceeds the store's maximum block size.
    #[error("block of {size} bytes exceeds maximum block size {max}")]
    BlockTooLarge { size: usize, max: usize },

    /// No block with this key exists.
    #[error("block missing: {0}")]
    BlockMissing(ContentKey),

    /// Failure in the backing record store.
    #[error("record store error: {0}")]
    Record(#[from] RecordError),

    /// The store configuration failed validation.
    #[error("invalid store configuration: {0}")]
    Config(#[from] TypeError),

    /// I/O error from the filesystem backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for block store operations.
pub type StoreResult<T> = Result<T, StoreError>;
