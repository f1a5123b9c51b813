//! Content-addressed block storage for stowage.
//!
//! A block is an immutable byte sequence no larger than the store's
//! `max_block_size`, identified by the hex digest of its bytes (its
//! [`ContentKey`](stowage_types::ContentKey)). Storing the same bytes twice
//! is a no-op that returns the existing key.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`FileBlockStore`] -- one file per block in a two-level shard tree,
//!   written through a staging directory and an atomic rename
//! - [`RecordBlockStore`] -- one record per block in a record collection
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content-addressing guarantees this).
//! 2. Oversized blocks are rejected before anything is written.
//! 3. Races between writers of identical content, and between deleters of
//!    the same block, are resolved as success.
//! 4. All other I/O and backend errors are propagated, never swallowed.
//! 5. The store never interprets block contents and never tracks
//!    references; that is the stream store's job.

pub mod error;
pub mod file;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileBlockStore;
pub use record::{BlockRecord, RecordBlockStore};
pub use traits::BlockStore;
