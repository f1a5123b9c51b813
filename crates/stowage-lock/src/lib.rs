//! Lease-based distributed locks for stowage.
//!
//! A lock is a record `(key, owner, created)` in a shared collection.
//! Acquiring races on a unique insert; a lock older than the manager's
//! `lock_timeout` is stale and may be stolen with a compare-and-swap on its
//! `created` field. Locks are not re-entrant and not nestable.
//!
//! [`LockManager::acquire`] returns a [`LockGuard`] that releases the lock
//! exactly once when dropped, on every exit path.

pub mod error;
pub mod manager;
pub mod record;

pub use error::{LockError, LockResult};
pub use manager::{LockGuard, LockManager, ReleaseOutcome};
pub use record::LockRecord;
