use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algorithm::HashAlgorithm;
use crate::error::TypeError;

/// Default maximum block size: 64 KiB.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 65536;

/// Recognized configuration options for block stores, lock managers and
/// stream stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest block a store accepts, in bytes. Also the stream chunk size.
    pub max_block_size: usize,
    /// Digest used for content keys and stream checksums.
    pub hash_function: HashAlgorithm,
    /// Long-stop validity of a lock, in seconds.
    pub lock_timeout_secs: u64,
    /// Default time a caller waits to acquire a lock, in seconds.
    pub acquire_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            hash_function: HashAlgorithm::Sha256,
            lock_timeout_secs: 180,
            acquire_timeout_secs: 60,
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, TypeError> {
        let config: Self = toml::from_str(s).map_err(|e| TypeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.max_block_size == 0 {
            return Err(TypeError::InvalidConfig("max_block_size must be positive".into()));
        }
        if self.lock_timeout_secs == 0 {
            return Err(TypeError::InvalidConfig("lock_timeout_secs must be positive".into()));
        }
        if self.acquire_timeout_secs == 0 {
            return Err(TypeError::InvalidConfig("acquire_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn with_max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    pub fn with_hash_function(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_function = algorithm;
        self
    }

    pub fn with_lock_timeout(mut self, secs: u64) -> Self {
        self.lock_timeout_secs = secs;
        self
    }

    pub fn with_acquire_timeout(mut self, secs: u64) -> Self {
        self.acquire_timeout_secs = secs;
        self
    }
}
