//! Foundation types for stowage, a content-addressed block store with
//! cooperative locking and chunked stream storage.
//!
//! Every other stowage crate depends on `stowage-types`.
//!
//! # Key Types
//!
//! - [`ContentKey`]: lowercase hex digest identifying a block by its bytes
//! - [`HashAlgorithm`]: the configurable digest used for keys and checksums
//! - [`InstanceId`] / [`OwnerToken`]: per-instance nonce and per-thread lock owner
//! - [`StoreConfig`]: recognized configuration options

pub mod algorithm;
pub mod config;
pub mod error;
pub mod identity;
pub mod key;

pub use algorithm::HashAlgorithm;
pub use config::{StoreConfig, DEFAULT_MAX_BLOCK_SIZE};
pub use error::TypeError;
pub use identity::{current_thread_ordinal, InstanceId, OwnerToken};
pub use key::ContentKey;
