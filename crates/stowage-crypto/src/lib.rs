//! Hashing primitives for stowage.
//!
//! Wraps established digest implementations (`sha2`, `blake3`) behind the
//! [`HashAlgorithm`](stowage_types::HashAlgorithm) selector; no custom
//! cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, StreamDigest};
