//! Deduplicated stream storage for stowage.
//!
//! A stream is a logical byte sequence cut into fixed-size blocks. Each
//! block is stored once in a [`BlockStore`](stowage_store::BlockStore)
//! under its content key, however many streams reference it; the stream
//! itself is just metadata plus an ordered block list.
//!
//! - [`StreamStore`] creates, lists and deletes streams and their blocks,
//!   holding a content-key lock around every block-list mutation so
//!   garbage collection of orphaned blocks cannot race a writer.
//! - [`BlockCursor`] is a seekable `Read`/`Write`/`Seek` handle over one
//!   stream that keeps at most one block in memory.
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use stowage_stream::StreamStore;
//! use stowage_types::StoreConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StreamStore::in_memory(&StoreConfig::default())?;
//! let info = store.new_stream(None, None)?;
//!
//! let mut w = store.open_stream(&info, "wb")?;
//! w.write_all(b"hello")?;
//! w.close()?;
//!
//! let mut buf = Vec::new();
//! store.open_stream(&info, "rb")?.read_to_end(&mut buf)?;
//! assert_eq!(buf, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod cursor;
pub mod error;
pub mod mode;
pub mod store;
pub mod types;

pub use cursor::BlockCursor;
pub use error::{StreamError, StreamResult};
pub use mode::OpenMode;
pub use store::StreamStore;
pub use types::{BlockEntry, StreamId, StreamInfo, DEFAULT_MIMETYPE};
