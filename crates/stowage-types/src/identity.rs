use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Random nonce identifying one lock manager or block store instance.
///
/// Generated once at construction and injected wherever an owner identity
/// is needed; combined with the calling thread to form an [`OwnerToken`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh random instance id (8 hex characters).
    pub fn random() -> Self {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Use a fixed identifier (tests, or ids handed down by a supervisor).
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner token for the calling thread.
    pub fn owner_token(&self) -> OwnerToken {
        OwnerToken(format!("{}_{}", self.0, current_thread_ordinal()))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of a lock holder: instance nonce plus thread ordinal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(String);

impl OwnerToken {
    pub fn from_raw(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_THREAD_ORDINAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ORDINAL: u64 = NEXT_THREAD_ORDINAL.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, stable number for the calling thread.
pub fn current_thread_ordinal() -> u64 {
    THREAD_ORDINAL.with(|n| *n)
}
