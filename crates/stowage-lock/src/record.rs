use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stowage_records::Record;
use stowage_types::OwnerToken;

/// A held lease on an arbitrary string key.
///
/// `created` is the optimistic-concurrency field: stealing a stale lock and
/// refreshing a lock about to expire both compare-and-swap on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub hash: String,
    pub owner: OwnerToken,
    pub created: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(hash: impl Into<String>, owner: OwnerToken, created: DateTime<Utc>) -> Self {
        Self {
            hash: hash.into(),
            owner,
            created,
        }
    }

    /// Time since `created`; zero if `created` lies in the future.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        now.signed_duration_since(self.created)
            .to_std()
            .unwrap_or_default()
    }
}

impl Record for LockRecord {
    type Version = DateTime<Utc>;

    fn key(&self) -> &str {
        &self.hash
    }

    fn version(&self) -> DateTime<Utc> {
        self.created
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "hash" => Some(self.hash.clone()),
            "owner" => Some(self.owner.to_string()),
            _ => None,
        }
    }
}
