use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use stowage_crypto::StreamDigest;
use stowage_lock::LockManager;
use stowage_records::{Collection, FieldFilter, InMemoryCollection, RecordError};
use stowage_store::{BlockStore, RecordBlockStore, StoreError};
use stowage_types::{ContentKey, HashAlgorithm, StoreConfig, TypeError};
use tracing::{debug, warn};

use crate::cursor::BlockCursor;
use crate::error::{StreamError, StreamResult};
use crate::mode::OpenMode;
use crate::types::{validate_mimetype, BlockEntry, StreamId, StreamInfo, DEFAULT_MIMETYPE};

/// Maps streams onto a content-addressed block store.
///
/// Every block-list mutation runs under the lock for the content key it
/// touches, so a writer adding a reference and a deleter collecting the
/// last one can never interleave on the same block.
pub struct StreamStore {
    blocks: Arc<dyn BlockStore>,
    locks: LockManager,
    streams: Arc<dyn Collection<StreamInfo>>,
    block_list: Arc<dyn Collection<BlockEntry>>,
    acquire_timeout: Duration,
}

impl StreamStore {
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        locks: LockManager,
        streams: Arc<dyn Collection<StreamInfo>>,
        block_list: Arc<dyn Collection<BlockEntry>>,
        acquire_timeout: Duration,
    ) -> StreamResult<Self> {
        if blocks.max_block_size() == 0 {
            let err = TypeError::InvalidConfig("max_block_size must be positive".into());
            return Err(StoreError::from(err).into());
        }
        Ok(Self {
            blocks,
            locks,
            streams,
            block_list,
            acquire_timeout,
        })
    }

    /// Stream store over `blocks` with in-memory metadata, block-list and
    /// lock collections.
    pub fn with_block_store(blocks: Arc<dyn BlockStore>, config: &StoreConfig) -> StreamResult<Self> {
        config.validate().map_err(StoreError::from)?;
        Self::new(
            blocks,
            LockManager::from_config(Arc::new(InMemoryCollection::new("locks")), config),
            Arc::new(InMemoryCollection::new("streams")),
            Arc::new(InMemoryCollection::new("blocklists")),
            config.acquire_timeout(),
        )
    }

    /// Fully in-memory stream store.
    pub fn in_memory(config: &StoreConfig) -> StreamResult<Self> {
        Self::with_block_store(Arc::new(RecordBlockStore::in_memory(config)?), config)
    }

    pub fn block_store(&self) -> &dyn BlockStore {
        self.blocks.as_ref()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Size of every block except possibly a stream's last.
    pub fn block_size(&self) -> usize {
        self.blocks.max_block_size()
    }

    /// Hash function behind content keys and stream checksums.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.blocks.hasher().algorithm()
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    // ---- streams ----

    /// Create an empty stream.
    ///
    /// `mimetype` defaults to `application/octet-stream`; `created`
    /// defaults to now.
    pub fn new_stream(
        &self,
        mimetype: Option<&str>,
        created: Option<DateTime<Utc>>,
    ) -> StreamResult<StreamInfo> {
        let mimetype = mimetype.unwrap_or(DEFAULT_MIMETYPE);
        validate_mimetype(mimetype)?;
        let created = created.unwrap_or_else(Utc::now);
        let info = StreamInfo {
            id: StreamId::new(),
            mimetype: mimetype.to_string(),
            created,
            modified: created,
            size: 0,
            checksum: Some(StreamDigest::empty_hex(self.hash_algorithm())),
        };
        self.streams.insert(info.clone())?;
        debug!(stream = %info.id, mimetype = %info.mimetype, "stream created");
        Ok(info)
    }

    /// Current metadata for `id`.
    pub fn get_stream(&self, id: &StreamId) -> StreamResult<StreamInfo> {
        self.streams
            .find(id.as_str())?
            .ok_or_else(|| StreamError::StreamNotFound(id.clone()))
    }

    /// Overwrite the metadata record for `info.id`.
    pub fn update_stream(&self, info: &StreamInfo) -> StreamResult<()> {
        validate_mimetype(&info.mimetype)?;
        match self.streams.update(info) {
            Ok(()) => Ok(()),
            Err(RecordError::NotFound { .. }) => Err(StreamError::StreamNotFound(info.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a cursor on a stream. `mode` is an `fopen`-style string such as
    /// `"rb"`, `"w"` or `"a+"`.
    pub fn open_stream(&self, info: &StreamInfo, mode: &str) -> StreamResult<BlockCursor<'_>> {
        self.open_with_mode(info, mode.parse()?)
    }

    pub fn open_with_mode(&self, info: &StreamInfo, mode: OpenMode) -> StreamResult<BlockCursor<'_>> {
        BlockCursor::open(self, &info.id, mode)
    }

    /// Delete a stream, its block list and any blocks left unreferenced.
    pub fn delete_stream(&self, id: &StreamId) -> StreamResult<()> {
        self.delete_blocks(id, 0)?;
        match self.streams.delete(id.as_str()) {
            Ok(()) => {
                debug!(stream = %id, "stream deleted");
                Ok(())
            }
            Err(RecordError::NotFound { .. }) => Err(StreamError::StreamNotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    // ---- blocks ----

    /// Add block `seq` to `stream` and store its bytes.
    ///
    /// The block-list entry is written first and the bytes second, under
    /// the content-key lock; a concurrent collector that sees the entry
    /// therefore keeps the block. If storing fails the entry is removed
    /// again.
    pub fn store_block(&self, stream: &StreamId, seq: u64, data: &[u8]) -> StreamResult<BlockEntry> {
        self.blocks.check_size(data)?;
        let entry = BlockEntry::new(stream.clone(), seq, self.blocks.key(data));
        self.block_list.insert(entry.clone())?;
        if let Err(e) = self.store_locked(&entry.hash, data) {
            match self.block_list.delete(entry.id()) {
                Ok(()) | Err(RecordError::NotFound { .. }) => {}
                Err(cleanup) => {
                    warn!(entry = entry.id(), error = %cleanup, "failed to remove block entry");
                }
            }
            return Err(e);
        }
        debug!(stream = %stream, seq, key = %entry.hash.short_hex(), "block stored");
        Ok(entry)
    }

    fn store_locked(&self, key: &ContentKey, data: &[u8]) -> StreamResult<()> {
        let _guard = self.locks.acquire(key.as_str(), self.acquire_timeout)?;
        self.blocks.store(data)?;
        Ok(())
    }

    /// Replace the content of an existing block-list entry.
    ///
    /// A no-op when `data` hashes to the entry's current key. Otherwise
    /// the old and new keys are both locked (old first), the new bytes
    /// stored, the entry repointed and the old block deleted if nothing
    /// else references it. `entry` is updated in place.
    pub fn update_block(&self, entry: &mut BlockEntry, data: &[u8]) -> StreamResult<()> {
        self.blocks.check_size(data)?;
        let new_key = self.blocks.key(data);
        if new_key == entry.hash {
            return Ok(());
        }
        let old_key = entry.hash.clone();

        let _old = self.locks.acquire(old_key.as_str(), self.acquire_timeout)?;
        let _new = self.locks.acquire(new_key.as_str(), self.acquire_timeout)?;
        self.blocks.store(data)?;

        let mut updated = entry.clone();
        updated.hash = new_key.clone();
        if let Err(e) = self.block_list.update_if(&updated, &old_key) {
            if let Err(cleanup) = self.delete_if_orphaned(&new_key) {
                warn!(key = %new_key.short_hex(), error = %cleanup, "failed to collect unreferenced block");
            }
            return Err(e.into());
        }
        *entry = updated;

        self.delete_if_orphaned(&old_key)
    }

    /// Block list of `stream`, ordered by sequence number.
    pub fn list_blocks(&self, stream: &StreamId) -> StreamResult<Vec<BlockEntry>> {
        let mut entries = self
            .block_list
            .select(&FieldFilter::eq("stream", stream.as_str()))?;
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    pub fn retrieve_block(&self, entry: &BlockEntry) -> StreamResult<Vec<u8>> {
        Ok(self.blocks.retrieve(&entry.hash)?)
    }

    /// Remove every block-list entry of `stream` with `seq >= from_seq`,
    /// deleting each block no other entry still references.
    pub fn delete_blocks(&self, stream: &StreamId, from_seq: u64) -> StreamResult<()> {
        for entry in self.list_blocks(stream)? {
            if entry.seq < from_seq {
                continue;
            }
            let _guard = self.locks.acquire(entry.hash.as_str(), self.acquire_timeout)?;
            match self.block_list.delete(entry.id()) {
                Ok(()) | Err(RecordError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            self.delete_if_orphaned(&entry.hash)?;
        }
        Ok(())
    }

    /// Caller must hold the lock on `key`.
    fn delete_if_orphaned(&self, key: &ContentKey) -> StreamResult<()> {
        let refs = self
            .block_list
            .count_matching(&FieldFilter::eq("hash", key.as_str()))?;
        if refs == 0 {
            self.blocks.delete(key)?;
            debug!(key = %key.short_hex(), "deleted orphan block");
        }
        Ok(())
    }
}

impl std::fmt::Debug for StreamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStore")
            .field("block_size", &self.block_size())
            .field("hash", &self.hash_algorithm())
            .field("locks", &self.locks)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}
