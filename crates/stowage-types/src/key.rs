use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-addressed identifier for a stored block.
///
/// A `ContentKey` is the lowercase hex digest of a block's bytes under the
/// store's configured [`HashAlgorithm`](crate::HashAlgorithm). Identical
/// content always produces the same key, which is what makes blocks
/// deduplicatable.
///
/// Keys are validated on construction: only hex digits, and long enough to
/// be split into the two-level shard layout used by filesystem stores.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentKey(String);

impl ContentKey {
    /// Minimum number of hex characters in a key (`aa/bb/c...`).
    pub const MIN_LEN: usize = 5;

    /// Build a key from raw digest bytes.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Parse from a hex string. Upper-case input is normalized to lower case.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() < Self::MIN_LEN {
            return Err(TypeError::KeyTooShort {
                min: Self::MIN_LEN,
                actual: s.len(),
            });
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// The full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hex representation (first 8 characters) for logs.
    pub fn short_hex(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }

    /// Split the key into its shard components: `(key[0:2], key[2:4], key[4:])`.
    pub fn shard_path(&self) -> (&str, &str, &str) {
        (&self.0[0..2], &self.0[2..4], &self.0[4..])
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.short_hex())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ContentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
