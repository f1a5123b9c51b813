//! The [`Record`] and [`Collection`] traits defining the record store
//! interface.

use std::fmt::Debug;

use crate::error::{RecordError, Result};

/// A keyed record stored in a [`Collection`].
pub trait Record: Clone + Send + Sync + 'static {
    /// Field compared by [`Collection::update_if`].
    type Version: Clone + PartialEq + Debug + Send + Sync;

    /// Unique key within the collection.
    fn key(&self) -> &str;

    /// Current value of the concurrency-control field.
    fn version(&self) -> Self::Version;

    /// String value of a named field, for equality filters.
    ///
    /// Returns `None` for unknown fields; such filters match nothing.
    fn field(&self, name: &str) -> Option<String>;
}

/// Equality filter on a single record field (`field eq value`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        record.field(&self.field).as_deref() == Some(self.value.as_str())
    }
}

/// A named collection of keyed records.
///
/// Implementations must be thread-safe and make each operation atomic with
/// respect to the others: unique insert, compare-and-swap update and delete
/// are the primitives all locking in stowage is built on.
pub trait Collection<R: Record>: Send + Sync {
    /// Collection name, used in errors and logs.
    fn name(&self) -> &str;

    /// Insert a new record. Fails with `DuplicateKey` if the key exists.
    fn insert(&self, record: R) -> Result<()>;

    /// Fetch a record. Fails with `NotFound`.
    fn get(&self, key: &str) -> Result<R>;

    /// Unconditionally replace an existing record. Fails with `NotFound`.
    fn update(&self, record: &R) -> Result<()>;

    /// Replace an existing record only if its stored version still equals
    /// `expected`. Fails with `NotFound` or `ConcurrencyConflict`.
    fn update_if(&self, record: &R, expected: &R::Version) -> Result<()>;

    /// Remove a record. Fails with `NotFound`.
    fn delete(&self, key: &str) -> Result<()>;

    /// Number of records matching `filter`.
    fn count_matching(&self, filter: &FieldFilter) -> Result<usize>;

    /// All records matching `filter`, ordered by key.
    fn select(&self, filter: &FieldFilter) -> Result<Vec<R>>;

    /// Total number of records.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fetch a record, mapping `NotFound` to `None`.
    fn find(&self, key: &str) -> Result<Option<R>> {
        match self.get(key) {
            Ok(record) => Ok(Some(record)),
            Err(RecordError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }
}
