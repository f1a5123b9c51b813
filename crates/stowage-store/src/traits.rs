use stowage_crypto::ContentHasher;
use stowage_types::ContentKey;

use crate::error::{StoreError, StoreResult};

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - `key` is a pure function of the bytes: identical bytes, identical key.
/// - `store` is idempotent and durable: once it returns, the block can be
///   retrieved, and storing it again returns the same key without a rewrite.
/// - `store` fails with [`StoreError::BlockTooLarge`] before writing anything
///   when `data.len() > max_block_size()`.
/// - `retrieve` fails with [`StoreError::BlockMissing`] for unknown keys and
///   never returns partially written bytes.
/// - `delete` of an unknown key succeeds.
pub trait BlockStore: Send + Sync {
    /// Largest block this store accepts, in bytes.
    fn max_block_size(&self) -> usize;

    /// Hasher used to derive content keys.
    fn hasher(&self) -> ContentHasher;

    /// Content key of `data`.
    fn key(&self, data: &[u8]) -> ContentKey {
        self.hasher().key(data)
    }

    /// Store a block and return its content key.
    fn store(&self, data: &[u8]) -> StoreResult<ContentKey>;

    /// Read a block by key.
    fn retrieve(&self, key: &ContentKey) -> StoreResult<Vec<u8>>;

    /// Delete a block by key. Deleting a missing block is not an error.
    fn delete(&self, key: &ContentKey) -> StoreResult<()>;

    /// Check whether a block exists.
    fn contains(&self, key: &ContentKey) -> StoreResult<bool>;

    /// Reject blocks larger than [`max_block_size`](Self::max_block_size).
    fn check_size(&self, data: &[u8]) -> StoreResult<()> {
        if data.len() > self.max_block_size() {
            return Err(StoreError::BlockTooLarge {
                size: data.len(),
                max: self.max_block_size(),
            });
        }
        Ok(())
    }
}

/// Behaviour every backend must share, exercised against each one.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;

    pub const FOX: &[u8] = b"The quick brown fox jumped over the lazy dog";
    pub const CAFE: &[u8] = "Caf\u{e9}".as_bytes();

    pub fn store_and_retrieve(bs: &dyn BlockStore) {
        let kfox = bs.store(FOX).unwrap();
        assert_eq!(kfox.as_str().len(), 64);
        assert_eq!(kfox, bs.key(FOX));
        let kcafe = bs.store(CAFE).unwrap();

        assert_eq!(bs.retrieve(&kfox).unwrap(), FOX);
        assert_eq!(bs.retrieve(&kcafe).unwrap(), CAFE);

        let kx = bs.key(b"x");
        assert!(matches!(bs.retrieve(&kx), Err(StoreError::BlockMissing(k)) if k == kx));

        assert_eq!(bs.store(FOX).unwrap(), kfox);
    }

    pub fn rejects_oversized(bs: &dyn BlockStore) {
        assert_eq!(bs.max_block_size(), 256);
        let mut data = b"0123456789ABCDEF".repeat(16);
        bs.store(&data).unwrap();
        data.push(b'X');
        let err = bs.store(&data).unwrap_err();
        assert!(matches!(err, StoreError::BlockTooLarge { size: 257, max: 256 }));
        assert!(!bs.contains(&bs.key(&data)).unwrap());
    }

    pub fn delete_is_tolerant(bs: &dyn BlockStore) {
        let kfox = bs.store(FOX).unwrap();
        let kcafe = bs.store(CAFE).unwrap();
        bs.delete(&kcafe).unwrap();
        assert!(matches!(bs.retrieve(&kcafe), Err(StoreError::BlockMissing(_))));
        // Second delete of the same block is benign.
        bs.delete(&kcafe).unwrap();
        assert_eq!(bs.retrieve(&kfox).unwrap(), FOX);
    }

    pub fn empty_block_is_storable(bs: &dyn BlockStore) {
        let key = bs.store(b"").unwrap();
        assert_eq!(bs.retrieve(&key).unwrap(), Vec::<u8>::new());
    }
}
