use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stowage_records::Record;
use stowage_types::ContentKey;

use crate::error::{StreamError, StreamResult};

/// Mime type given to streams created without one.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Store-assigned stream identifier (a time-ordered UUID v7).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

impl StreamId {
    /// Generate a new time-ordered stream ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> &str {
        &self.0[..8]
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.short_id())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(uuid::Uuid::parse_str(s)?))
    }
}

impl TryFrom<String> for StreamId {
    type Error = uuid::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

/// Mutable metadata for one stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub mimetype: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Logical length in bytes.
    pub size: u64,
    /// Hex digest of the whole stream, or `None` when unknown because the
    /// last write session was not strictly sequential.
    pub checksum: Option<String>,
}

impl Record for StreamInfo {
    type Version = DateTime<Utc>;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn version(&self) -> DateTime<Utc> {
        self.modified
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "mimetype" => Some(self.mimetype.clone()),
            "checksum" => self.checksum.clone(),
            _ => None,
        }
    }
}

/// One entry of a stream's block list: block `seq` of `stream` holds the
/// bytes stored under `hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    id: String,
    pub stream: StreamId,
    pub seq: u64,
    pub hash: ContentKey,
}

impl BlockEntry {
    pub fn new(stream: StreamId, seq: u64, hash: ContentKey) -> Self {
        Self {
            id: Self::record_key(&stream, seq),
            stream,
            seq,
            hash,
        }
    }

    /// Record key for block `seq` of `stream`. Zero-padded so key order
    /// matches sequence order.
    pub fn record_key(stream: &StreamId, seq: u64) -> String {
        format!("{stream}/{seq:020}")
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Record for BlockEntry {
    // Rewriting an entry swaps its content key; compare-and-swap on it.
    type Version = ContentKey;

    fn key(&self) -> &str {
        &self.id
    }

    fn version(&self) -> ContentKey {
        self.hash.clone()
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "stream" => Some(self.stream.to_string()),
            "seq" => Some(self.seq.to_string()),
            "hash" => Some(self.hash.to_string()),
            _ => None,
        }
    }
}

/// Check a mime type of the form `type/subtype[; name=value]*`.
pub(crate) fn validate_mimetype(mimetype: &str) -> StreamResult<()> {
    let invalid = || StreamError::InvalidMimeType(mimetype.to_string());
    let mut parts = mimetype.split(';');
    let essence = parts.next().unwrap_or_default().trim();
    let (kind, subtype) = essence.split_once('/').ok_or_else(invalid)?;
    if !is_token(kind) || !is_token(subtype) {
        return Err(invalid());
    }
    for param in parts {
        let (name, value) = param.trim().split_once('=').ok_or_else(invalid)?;
        if !is_token(name) || value.is_empty() {
            return Err(invalid());
        }
    }
    Ok(())
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}
