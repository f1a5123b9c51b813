use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use stowage_records::{Collection, InMemoryCollection, RecordError};
use stowage_types::{InstanceId, OwnerToken, StoreConfig};
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};
use crate::record::LockRecord;

/// Remaining validity below which release refreshes the lock before
/// deleting it.
const RELEASE_MARGIN: Duration = Duration::from_secs(1);

/// What [`LockManager::release`] found when it went to remove a lock.
///
/// Every variant other than `Released` means the holder was slower than
/// `lock_timeout`; seeing them often suggests raising the timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Our lock was present and has been removed.
    Released,
    /// The lock was already gone (reclaimed after timing out).
    StaleDetected,
    /// The lock timed out and is now held by another owner; left in place.
    StaleReused,
    /// The lock was reclaimed by another owner while we were removing it.
    StaleRace,
}

/// Result of a single acquisition attempt.
enum Attempt {
    Acquired,
    /// The conflicting lock disappeared between insert and read.
    Vanished,
    Busy,
}

/// Acquires and releases named, time-bounded leases over a shared lock
/// collection.
///
/// The owner token combines this manager's [`InstanceId`] with the calling
/// thread, so two managers (or two threads of one manager) never share an
/// identity.
pub struct LockManager {
    locks: Arc<dyn Collection<LockRecord>>,
    lock_timeout: Duration,
    instance: InstanceId,
}

impl LockManager {
    /// Create a manager with a random instance id.
    pub fn new(locks: Arc<dyn Collection<LockRecord>>, lock_timeout: Duration) -> Self {
        Self::with_instance(locks, lock_timeout, InstanceId::random())
    }

    /// Create a manager with an explicit instance id.
    pub fn with_instance(
        locks: Arc<dyn Collection<LockRecord>>,
        lock_timeout: Duration,
        instance: InstanceId,
    ) -> Self {
        Self {
            locks,
            lock_timeout,
            instance,
        }
    }

    pub fn from_config(locks: Arc<dyn Collection<LockRecord>>, config: &StoreConfig) -> Self {
        Self::new(locks, config.lock_timeout())
    }

    /// Manager over a fresh in-memory collection named `locks`.
    pub fn in_memory(lock_timeout: Duration) -> Self {
        Self::new(Arc::new(InMemoryCollection::new("locks")), lock_timeout)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Owner token for the calling thread.
    pub fn owner_token(&self) -> OwnerToken {
        self.instance.owner_token()
    }

    /// Acquire the lock on `key`, waiting up to `timeout`.
    ///
    /// Between attempts the calling thread sleeps for a random interval in
    /// `[0, timeout / 5]`. At least one attempt is always made, even with a
    /// zero timeout.
    pub fn acquire(&self, key: &str, timeout: Duration) -> LockResult<LockGuard<'_>> {
        let owner = self.owner_token();
        let started = Instant::now();
        let deadline = started + timeout;
        let mut wait = Duration::ZERO;

        loop {
            if !wait.is_zero() {
                thread::sleep(wait.min(deadline.saturating_duration_since(Instant::now())));
            }
            match self.try_acquire(key, &owner)? {
                Attempt::Acquired => {
                    debug!(key, owner = %owner, "lock acquired");
                    return Ok(LockGuard {
                        manager: self,
                        key: key.to_string(),
                        owner,
                        active: true,
                    });
                }
                Attempt::Vanished => wait = Duration::ZERO,
                Attempt::Busy => wait = random_backoff(timeout),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        warn!(key, ?timeout, "timeout acquiring lock");
        Err(LockError::Timeout {
            key: key.to_string(),
            waited: started.elapsed(),
        })
    }

    fn try_acquire(&self, key: &str, owner: &OwnerToken) -> LockResult<Attempt> {
        let now = Utc::now();
        match self.locks.insert(LockRecord::new(key, owner.clone(), now)) {
            Ok(()) => return Ok(Attempt::Acquired),
            Err(RecordError::DuplicateKey { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let existing = match self.locks.find(key)? {
            Some(lock) => lock,
            None => return Ok(Attempt::Vanished),
        };
        if existing.age(now) <= self.lock_timeout {
            return Ok(Attempt::Busy);
        }

        let stolen = LockRecord::new(key, owner.clone(), Utc::now());
        match self.locks.update_if(&stolen, &existing.created) {
            Ok(()) => {
                warn!(key, previous_owner = %existing.owner, "removed stale lock");
                Ok(Attempt::Acquired)
            }
            Err(RecordError::NotFound { .. }) => Ok(Attempt::Vanished),
            Err(RecordError::ConcurrencyConflict { .. }) => Ok(Attempt::Busy),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the calling thread's lock on `key`.
    ///
    /// Normally invoked by dropping the [`LockGuard`]. Releasing a lock
    /// that is missing or held by someone else is not an error; the
    /// returned [`ReleaseOutcome`] says what was found.
    pub fn release(&self, key: &str) -> LockResult<ReleaseOutcome> {
        self.release_owned(key, &self.owner_token())
    }

    fn release_owned(&self, key: &str, owner: &OwnerToken) -> LockResult<ReleaseOutcome> {
        let lock = match self.locks.find(key)? {
            Some(lock) => lock,
            None => return Ok(stale_detected(key)),
        };
        if lock.owner != *owner {
            warn!(key, holder = %lock.owner, "stale lock reused");
            return Ok(ReleaseOutcome::StaleReused);
        }

        // Close to expiry someone may reclaim the lock between our read
        // and our delete; refresh it first so the delete is still ours.
        let now = Utc::now();
        if self.lock_timeout.saturating_sub(lock.age(now)) < RELEASE_MARGIN {
            let touched = LockRecord::new(key, owner.clone(), now);
            match self.locks.update_if(&touched, &lock.created) {
                Ok(()) => {}
                Err(RecordError::ConcurrencyConflict { .. }) => {
                    warn!(key, "stale lock race");
                    return Ok(ReleaseOutcome::StaleRace);
                }
                Err(RecordError::NotFound { .. }) => return Ok(stale_detected(key)),
                Err(e) => return Err(e.into()),
            }
        }

        match self.locks.delete(key) {
            Ok(()) => {
                debug!(key, "lock released");
                Ok(ReleaseOutcome::Released)
            }
            Err(RecordError::NotFound { .. }) => Ok(stale_detected(key)),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("collection", &self.locks.name())
            .field("lock_timeout", &self.lock_timeout)
            .field("instance", &self.instance)
            .finish()
    }
}

fn stale_detected(key: &str) -> ReleaseOutcome {
    warn!(key, "stale lock detected");
    ReleaseOutcome::StaleDetected
}

fn random_backoff(timeout: Duration) -> Duration {
    let max_ms = (timeout / 5).as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// A held lock. Dropping the guard releases it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    key: String,
    owner: OwnerToken,
    active: bool,
}

impl LockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    /// Release now and report what was found.
    pub fn release(mut self) -> LockResult<ReleaseOutcome> {
        self.active = false;
        self.manager.release_owned(&self.key, &self.owner)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.manager.release_owned(&self.key, &self.owner) {
            warn!(key = %self.key, error = %e, "failed to release lock");
        }
    }
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use stowage_records::{FieldFilter, Result as RecordResult};

    const KEY: &str = "b5a3b7c1f5e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4b3a2f1e0d9c8b7a6f5e4d3c2";
    const KEY2: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn manager_over(locks: Arc<InMemoryCollection<LockRecord>>, lock_timeout: Duration) -> LockManager {
        LockManager::new(locks, lock_timeout)
    }

    #[test]
    fn default_lock_timeout_from_config() {
        let ls = LockManager::from_config(
            Arc::new(InMemoryCollection::new("locks")),
            &StoreConfig::default(),
        );
        assert_eq!(ls.lock_timeout(), secs(180));
    }

    #[test]
    fn held_lock_blocks_second_acquire() {
        let ls = LockManager::in_memory(secs(180));
        let _other = ls.acquire(KEY2, secs(60)).unwrap();
        let held = ls.acquire(KEY, secs(60)).unwrap();

        let err = ls.acquire(KEY, secs(1)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { ref key, .. } if key == KEY));

        assert_eq!(held.release().unwrap(), ReleaseOutcome::Released);
        let again = ls.acquire(KEY, secs(1)).unwrap();
        drop(again);

        // Releasing twice is benign.
        assert_eq!(ls.release(KEY).unwrap(), ReleaseOutcome::StaleDetected);
        assert_eq!(ls.release(KEY2).unwrap(), ReleaseOutcome::Released);
        assert_eq!(ls.release(KEY2).unwrap(), ReleaseOutcome::StaleDetected);
    }

    #[test]
    fn zero_timeout_still_attempts_once() {
        let ls = LockManager::in_memory(secs(180));
        let guard = ls.acquire(KEY, Duration::ZERO).unwrap();
        assert_eq!(guard.key(), KEY);
        assert!(ls.acquire(KEY, Duration::ZERO).is_err());
    }

    #[test]
    fn guard_drop_releases() {
        let locks = Arc::new(InMemoryCollection::new("locks"));
        let ls = manager_over(locks.clone(), secs(180));
        {
            let _guard = ls.acquire(KEY, secs(60)).unwrap();
            assert!(locks.contains(KEY).unwrap());
        }
        assert!(!locks.contains(KEY).unwrap());
        ls.acquire(KEY, secs(2)).expect("guard failed to unlock");
    }

    #[test]
    fn guard_releases_on_panic() {
        let ls = Arc::new(LockManager::in_memory(secs(180)));
        let worker = {
            let ls = Arc::clone(&ls);
            thread::spawn(move || {
                let _guard = ls.acquire(KEY, secs(5)).unwrap();
                panic!("holder failed");
            })
        };
        assert!(worker.join().is_err());
        ls.acquire(KEY, secs(2)).expect("lock leaked by panicking holder");
    }

    #[test]
    fn stale_lock_is_recovered() {
        let ls = LockManager::in_memory(secs(1));
        let abandoned = ls.acquire(KEY, secs(60)).unwrap();
        std::mem::forget(abandoned);
        let guard = ls.acquire(KEY, secs(5)).expect("stale lock not reclaimed");
        drop(guard);
    }

    #[test]
    fn release_leaves_foreign_lock_in_place() {
        let locks = Arc::new(InMemoryCollection::new("locks"));
        let ls = manager_over(locks.clone(), secs(180));
        locks
            .insert(LockRecord::new(KEY, OwnerToken::from_raw("someone_else_7"), Utc::now()))
            .unwrap();
        assert_eq!(ls.release(KEY).unwrap(), ReleaseOutcome::StaleReused);
        assert!(locks.contains(KEY).unwrap());
    }

    #[test]
    fn expired_own_lock_is_refreshed_then_released() {
        let locks = Arc::new(InMemoryCollection::new("locks"));
        let ls = manager_over(locks.clone(), secs(10));
        let old = Utc::now() - ChronoDuration::seconds(60);
        locks
            .insert(LockRecord::new(KEY, ls.owner_token(), old))
            .unwrap();
        assert_eq!(ls.release(KEY).unwrap(), ReleaseOutcome::Released);
        assert!(!locks.contains(KEY).unwrap());
    }

    /// Lock collection whose compare-and-swap always loses, as if another
    /// owner reclaimed the lock a moment earlier.
    struct AlwaysConflicting(InMemoryCollection<LockRecord>);

    impl Collection<LockRecord> for AlwaysConflicting {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn insert(&self, record: LockRecord) -> RecordResult<()> {
            self.0.insert(record)
        }
        fn get(&self, key: &str) -> RecordResult<LockRecord> {
            self.0.get(key)
        }
        fn update(&self, record: &LockRecord) -> RecordResult<()> {
            self.0.update(record)
        }
        fn update_if(&self, record: &LockRecord, _expected: &chrono::DateTime<Utc>) -> RecordResult<()> {
            Err(RecordError::ConcurrencyConflict {
                collection: self.0.name().to_string(),
                key: record.hash.clone(),
            })
        }
        fn delete(&self, key: &str) -> RecordResult<()> {
            self.0.delete(key)
        }
        fn count_matching(&self, filter: &FieldFilter) -> RecordResult<usize> {
            self.0.count_matching(filter)
        }
        fn select(&self, filter: &FieldFilter) -> RecordResult<Vec<LockRecord>> {
            self.0.select(filter)
        }
        fn len(&self) -> RecordResult<usize> {
            self.0.len()
        }
    }

    #[test]
    fn refresh_conflict_reports_race_and_keeps_lock() {
        let locks = Arc::new(AlwaysConflicting(InMemoryCollection::new("locks")));
        let ls = LockManager::new(locks.clone(), secs(10));
        let old = Utc::now() - ChronoDuration::seconds(60);
        locks
            .insert(LockRecord::new(KEY, ls.owner_token(), old))
            .unwrap();
        assert_eq!(ls.release(KEY).unwrap(), ReleaseOutcome::StaleRace);
        assert!(locks.contains(KEY).unwrap());
    }

    #[test]
    fn lost_steal_race_times_out() {
        let locks = Arc::new(AlwaysConflicting(InMemoryCollection::new("locks")));
        let ls = LockManager::new(locks.clone(), secs(1));
        let old = Utc::now() - ChronoDuration::seconds(60);
        locks
            .insert(LockRecord::new(KEY, OwnerToken::from_raw("crashed_1"), old))
            .unwrap();
        assert!(matches!(ls.acquire(KEY, secs(1)), Err(LockError::Timeout { .. })));
    }

    #[test]
    fn managers_sharing_a_collection_exclude_each_other() {
        let locks = Arc::new(InMemoryCollection::new("locks"));
        let a = manager_over(locks.clone(), secs(180));
        let b = manager_over(locks, secs(180));
        assert_ne!(a.owner_token(), b.owner_token());

        let held = a.acquire(KEY, secs(1)).unwrap();
        assert!(b.acquire(KEY, secs(1)).is_err());
        // b cannot release a's lock.
        assert_eq!(b.release(KEY).unwrap(), ReleaseOutcome::StaleReused);
        drop(held);
        b.acquire(KEY, secs(1)).unwrap();
    }

    #[test]
    fn concurrent_holders_never_overlap() {
        let ls = Arc::new(LockManager::in_memory(secs(180)));
        let inside = Arc::new(AtomicBool::new(false));
        let acquired = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ls = Arc::clone(&ls);
                let inside = Arc::clone(&inside);
                let acquired = Arc::clone(&acquired);
                thread::spawn(move || {
                    let Ok(_guard) = ls.acquire(KEY, secs(5)) else {
                        return;
                    };
                    assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                    thread::sleep(Duration::from_millis(20));
                    inside.store(false, Ordering::SeqCst);
                    acquired.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert!(acquired.load(Ordering::SeqCst) >= 1);
    }
}
