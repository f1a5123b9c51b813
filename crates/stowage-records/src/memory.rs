//! In-memory record collection for testing and single-process use.
//!
//! [`InMemoryCollection`] stores records in a `BTreeMap` protected by a
//! `RwLock`. Every operation takes the lock once, so unique insert and
//! compare-and-swap are atomic across threads sharing the collection.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RecordError, Result};
use crate::traits::{Collection, FieldFilter, Record};

/// An in-memory implementation of [`Collection`].
///
/// Data is lost when the collection is dropped.
pub struct InMemoryCollection<R: Record> {
    name: String,
    records: RwLock<BTreeMap<String, R>>,
}

impl<R: Record> InMemoryCollection<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot of every record, ordered by key.
    pub fn all(&self) -> Result<Vec<R>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, R>>> {
        self.records
            .read()
            .map_err(|e| RecordError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, R>>> {
        self.records
            .write()
            .map_err(|e| RecordError::Backend(format!("lock poisoned: {e}")))
    }

    fn not_found(&self, key: &str) -> RecordError {
        RecordError::NotFound {
            collection: self.name.clone(),
            key: key.to_string(),
        }
    }
}

impl<R: Record> Collection<R> for InMemoryCollection<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&self, record: R) -> Result<()> {
        let mut records = self.write()?;
        if records.contains_key(record.key()) {
            return Err(RecordError::DuplicateKey {
                collection: self.name.clone(),
                key: record.key().to_string(),
            });
        }
        records.insert(record.key().to_string(), record);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<R> {
        self.read()?
            .get(key)
            .cloned()
            .ok_or_else(|| self.not_found(key))
    }

    fn update(&self, record: &R) -> Result<()> {
        let mut records = self.write()?;
        match records.get_mut(record.key()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(self.not_found(record.key())),
        }
    }

    fn update_if(&self, record: &R, expected: &R::Version) -> Result<()> {
        let mut records = self.write()?;
        let slot = records
            .get_mut(record.key())
            .ok_or_else(|| self.not_found(record.key()))?;
        if slot.version() != *expected {
            tracing::debug!(
                collection = %self.name,
                key = record.key(),
                "compare-and-swap rejected"
            );
            return Err(RecordError::ConcurrencyConflict {
                collection: self.name.clone(),
                key: record.key().to_string(),
            });
        }
        *slot = record.clone();
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.write()?.remove(key) {
            Some(_) => Ok(()),
            None => Err(self.not_found(key)),
        }
    }

    fn count_matching(&self, filter: &FieldFilter) -> Result<usize> {
        Ok(self.read()?.values().filter(|r| filter.matches(*r)).count())
    }

    fn select(&self, filter: &FieldFilter) -> Result<Vec<R>> {
        Ok(self
            .read()?
            .values()
            .filter(|r| filter.matches(*r))
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

impl<R: Record> std::fmt::Debug for InMemoryCollection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.records.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("InMemoryCollection")
            .field("name", &self.name)
            .field("record_count", &count)
            .finish()
    }
}
