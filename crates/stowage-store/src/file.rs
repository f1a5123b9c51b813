use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use stowage_crypto::ContentHasher;
use stowage_types::{current_thread_ordinal, ContentKey, InstanceId, StoreConfig};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockStore;

/// Name of the staging directory under the store root.
const STAGING_DIR: &str = "tmp";

/// Filesystem-backed block store.
///
/// Each block is one file. The key is split into three components to bound
/// directory fan-out: key `abcdef123...` lives at `root/ab/cd/ef123...`.
///
/// Writes go to a uniquely named file in `root/tmp/` and are then renamed
/// into place, so readers see either no block or the complete block.
pub struct FileBlockStore {
    root: PathBuf,
    staging: PathBuf,
    hasher: ContentHasher,
    max_block_size: usize,
    instance: InstanceId,
    /// Keeps a temporary root alive (and removes it on drop).
    _temp: Option<TempDir>,
}

impl FileBlockStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, config: &StoreConfig) -> StoreResult<Self> {
        Self::build(root.into(), config, None)
    }

    /// Create a store in a fresh temporary directory that is removed when
    /// the store is dropped.
    pub fn temporary(config: &StoreConfig) -> StoreResult<Self> {
        let temp = tempfile::Builder::new()
            .prefix("stowage-blockstore-")
            .suffix(".d")
            .tempdir()?;
        let root = temp.path().to_path_buf();
        Self::build(root, config, Some(temp))
    }

    fn build(root: PathBuf, config: &StoreConfig, temp: Option<TempDir>) -> StoreResult<Self> {
        config.validate()?;
        let staging = root.join(STAGING_DIR);
        create_dir_tolerant(&staging)?;
        debug!(root = %root.display(), "opened file block store");
        Ok(Self {
            root,
            staging,
            hasher: ContentHasher::new(config.hash_function),
            max_block_size: config.max_block_size,
            instance: InstanceId::random(),
            _temp: temp,
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final on-disk location of a block.
    pub fn block_path(&self, key: &ContentKey) -> PathBuf {
        let (d1, d2, rest) = key.shard_path();
        self.root.join(d1).join(d2).join(rest)
    }

    /// Keys of every block currently on disk, sorted.
    pub fn keys(&self) -> StoreResult<Vec<ContentKey>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| {
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop in block store"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let joined: String = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            if let Ok(key) = ContentKey::from_hex(&joined) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn staging_prefix(&self, key: &ContentKey) -> String {
        let k = key.as_str();
        format!(
            "{}_{}_{}_",
            self.instance,
            current_thread_ordinal(),
            &k[..k.len().min(32)]
        )
    }
}

impl BlockStore for FileBlockStore {
    fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    fn hasher(&self) -> ContentHasher {
        self.hasher
    }

    fn store(&self, data: &[u8]) -> StoreResult<ContentKey> {
        self.check_size(data)?;
        let key = self.key(data);
        let path = self.block_path(&key);
        if path.exists() {
            return Ok(key);
        }

        let mut staged = tempfile::Builder::new()
            .prefix(&self.staging_prefix(&key))
            .tempfile_in(&self.staging)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;

        if let Some(parent) = path.parent() {
            create_dir_tolerant(parent)?;
        }
        if let Err(e) = staged.persist(&path) {
            // A concurrent writer of the same content may have won.
            if !path.exists() {
                return Err(e.error.into());
            }
        }
        debug!(key = %key.short_hex(), len = data.len(), "stored block");
        Ok(key)
    }

    fn retrieve(&self, key: &ContentKey) -> StoreResult<Vec<u8>> {
        match fs::read(self.block_path(key)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::BlockMissing(key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &ContentKey) -> StoreResult<()> {
        match fs::remove_file(self.block_path(key)) {
            Ok(()) => {
                debug!(key = %key.short_hex(), "deleted block");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &ContentKey) -> StoreResult<bool> {
        Ok(self.block_path(key).is_file())
    }
}

impl std::fmt::Debug for FileBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBlockStore")
            .field("root", &self.root)
            .field("max_block_size", &self.max_block_size)
            .field("hash", &self.hasher.algorithm())
            .finish()
    }
}

/// `create_dir_all` that treats losing a creation race as success.
fn create_dir_tolerant(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(_) if dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}
