use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stowage_crypto::ContentHasher;
use stowage_records::{Collection, InMemoryCollection, Record, RecordError};
use stowage_types::{ContentKey, StoreConfig};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockStore;

/// One stored block: content key plus binary payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: ContentKey,
    pub data: Vec<u8>,
}

impl Record for BlockRecord {
    // Blocks are immutable; there is nothing to compare-and-swap.
    type Version = ();

    fn key(&self) -> &str {
        self.hash.as_str()
    }

    fn version(&self) {}

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "hash" => Some(self.hash.to_string()),
            _ => None,
        }
    }
}

/// Block store backed by a record collection.
///
/// Each block is one record keyed by its content key. Two writers storing
/// the same content race on the unique insert; the loser sees
/// `DuplicateKey` and treats it as success.
pub struct RecordBlockStore {
    blocks: Arc<dyn Collection<BlockRecord>>,
    hasher: ContentHasher,
    max_block_size: usize,
}

impl RecordBlockStore {
    pub fn new(blocks: Arc<dyn Collection<BlockRecord>>, config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            blocks,
            hasher: ContentHasher::new(config.hash_function),
            max_block_size: config.max_block_size,
        })
    }

    /// Store backed by a fresh in-memory collection named `blocks`.
    pub fn in_memory(config: &StoreConfig) -> StoreResult<Self> {
        Self::new(Arc::new(InMemoryCollection::new("blocks")), config)
    }

    /// Number of physical blocks held.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.blocks.len()?)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.blocks.is_empty()?)
    }
}

impl BlockStore for RecordBlockStore {
    fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    fn hasher(&self) -> ContentHasher {
        self.hasher
    }

    fn store(&self, data: &[u8]) -> StoreResult<ContentKey> {
        self.check_size(data)?;
        let key = self.key(data);
        if self.blocks.contains(key.as_str())? {
            return Ok(key);
        }
        let record = BlockRecord {
            hash: key.clone(),
            data: data.to_vec(),
        };
        match self.blocks.insert(record) {
            Ok(()) => {
                debug!(key = %key.short_hex(), len = data.len(), "stored block record");
                Ok(key)
            }
            Err(RecordError::DuplicateKey { .. }) => Ok(key),
            Err(e) => Err(e.into()),
        }
    }

    fn retrieve(&self, key: &ContentKey) -> StoreResult<Vec<u8>> {
        match self.blocks.get(key.as_str()) {
            Ok(record) => Ok(record.data),
            Err(RecordError::NotFound { .. }) => Err(StoreError::BlockMissing(key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &ContentKey) -> StoreResult<()> {
        match self.blocks.delete(key.as_str()) {
            Ok(()) | Err(RecordError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &ContentKey) -> StoreResult<bool> {
        Ok(self.blocks.contains(key.as_str())?)
    }
}

impl std::fmt::Debug for RecordBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBlockStore")
            .field("collection", &self.blocks.name())
            .field("max_block_size", &self.max_block_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::conformance::{self, FOX};
    use std::thread;
    use stowage_types::HashAlgorithm;

    #[test]
    fn default_settings() {
        let bs = RecordBlockStore::in_memory(&StoreConfig::default()).unwrap();
        assert_eq!(bs.max_block_size(), 65536);
        assert_eq!(bs.hasher().algorithm(), HashAlgorithm::Sha256);
        assert!(bs.is_empty().unwrap());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let config = StoreConfig::default().with_max_block_size(0);
        let err = RecordBlockStore::in_memory(&config).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn store_and_retrieve() {
        conformance::store_and_retrieve(&RecordBlockStore::in_memory(&StoreConfig::default()).unwrap());
    }

    #[test]
    fn rejects_oversized() {
        let config = StoreConfig::default().with_max_block_size(256);
        let bs = RecordBlockStore::in_memory(&config).unwrap();
        conformance::rejects_oversized(&bs);
        // Only the in-limit block was written.
        assert_eq!(bs.len().unwrap(), 1);
    }

    #[test]
    fn delete_is_tolerant() {
        conformance::delete_is_tolerant(&RecordBlockStore::in_memory(&StoreConfig::default()).unwrap());
    }

    #[test]
    fn empty_block_is_storable() {
        conformance::empty_block_is_storable(&RecordBlockStore::in_memory(&StoreConfig::default()).unwrap());
    }

    #[test]
    fn blake3_keys() {
        let config = StoreConfig::default().with_hash_function(HashAlgorithm::Blake3);
        let bs = RecordBlockStore::in_memory(&config).unwrap();
        let key = bs.store(FOX).unwrap();
        assert_eq!(key, ContentHasher::new(HashAlgorithm::Blake3).key(FOX));
    }

    #[test]
    fn idempotent_store_keeps_one_record() {
        let bs = RecordBlockStore::in_memory(&StoreConfig::default()).unwrap();
        let k1 = bs.store(FOX).unwrap();
        let k2 = bs.store(FOX).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(bs.len().unwrap(), 1);
    }

    #[test]
    fn shared_collection_sees_other_writers() {
        let blocks: Arc<InMemoryCollection<BlockRecord>> = Arc::new(InMemoryCollection::new("blocks"));
        let a = RecordBlockStore::new(blocks.clone(), &StoreConfig::default()).unwrap();
        let b = RecordBlockStore::new(blocks, &StoreConfig::default()).unwrap();
        let key = a.store(FOX).unwrap();
        assert_eq!(b.retrieve(&key).unwrap(), FOX);
        b.delete(&key).unwrap();
        assert!(!a.contains(&key).unwrap());
    }

    #[test]
    fn concurrent_duplicate_inserts_succeed() {
        let bs = Arc::new(RecordBlockStore::in_memory(&StoreConfig::default()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bs = Arc::clone(&bs);
                thread::spawn(move || bs.store(FOX).unwrap())
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(bs.len().unwrap(), 1);
    }

    #[test]
    fn record_serializes_with_hash_field() {
        let record = BlockRecord {
            hash: ContentHasher::default().key(FOX),
            data: FOX.to_vec(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["hash"], record.hash.as_str());
        assert_eq!(record.field("hash").as_deref(), Some(record.hash.as_str()));
    }
}
