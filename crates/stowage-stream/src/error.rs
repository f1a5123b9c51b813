use std::io;

use stowage_lock::LockError;
use stowage_records::RecordError;
use stowage_store::StoreError;

use crate::types::StreamId;

/// Errors from stream store and cursor operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("stream metadata error: {0}")]
    Record(#[from] RecordError),

    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    #[error("invalid open mode: {0:?}")]
    InvalidMode(String),

    #[error("invalid mime type: {0:?}")]
    InvalidMimeType(String),

    #[error("stream not open for reading")]
    NotReadable,

    #[error("stream not open for writing")]
    NotWritable,

    #[error("cursor is closed")]
    Closed,

    /// Seek target before the start of the stream.
    #[error("invalid seek to {0}")]
    InvalidSeek(i128),
}

/// Result alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Store(StoreError::Io(e)) => e,
            StreamError::NotReadable | StreamError::NotWritable => {
                io::Error::new(io::ErrorKind::Unsupported, err)
            }
            StreamError::InvalidSeek(_) | StreamError::InvalidMode(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::other(other),
        }
    }
}
