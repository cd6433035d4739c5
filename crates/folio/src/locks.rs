//! Advisory per-file locks with timeout and staleness.
//!
//! [`LockManager`] keeps a table of held locks behind a mutex and wakes
//! waiters through a condition variable whenever a lock is released. A lock
//! held longer than the staleness threshold is considered abandoned and is
//! evicted by the next acquisition attempt on any path.
//!
//! Locks are advisory: they serialise writers going through the engine and do
//! not stop other processes from touching the files.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Identifies one held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockToken(u64);

impl LockToken {
    /// The numeric value of the token.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock-{}", self.0)
    }
}

/// Snapshot of a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// The locked file.
    pub file_path: PathBuf,
    /// Token of the holder.
    pub holder_token: LockToken,
    /// When the lock was taken.
    pub acquired_at: OffsetDateTime,
    /// When the lock becomes stale.
    pub expires_at: OffsetDateTime,
}

/// Errors from lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock did not become free within the timeout.
    #[error("timed out after {waited:?} waiting for {path}")]
    Timeout {
        /// The contended file.
        path: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },
    /// The lock is held and the caller asked not to wait.
    #[error("{path} is locked by {holder}")]
    Held {
        /// The contended file.
        path: PathBuf,
        /// The current holder.
        holder: LockToken,
    },
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    token: LockToken,
    expires: Instant,
    acquired_at: OffsetDateTime,
}

/// Table of advisory file locks.
#[derive(Debug)]
pub struct LockManager {
    table: Mutex<HashMap<PathBuf, LockEntry>>,
    released: Condvar,
    next_token: AtomicU64,
    stale_after: Duration,
}

impl LockManager {
    /// Creates a manager whose locks become stale after `stale_after`.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            next_token: AtomicU64::new(1),
            stale_after,
        }
    }

    /// Age after which a held lock is treated as abandoned.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Acquires the lock on `path`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock stays held for the whole
    /// timeout.
    pub fn acquire(&self, path: &Path, timeout: Duration) -> Result<LockGuard<'_>, LockError> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut table = self.table();
        loop {
            self.evict_stale(&mut table);
            if !table.contains_key(path) {
                let token = self.insert(&mut table, path);
                return Ok(LockGuard::new(self, token, path));
            }
            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if deadline > now => deadline - now,
                Some(_) => {
                    tracing::debug!(
                        target: "folio::locks",
                        path = %path.display(),
                        waited_ms = started.elapsed().as_millis(),
                        "lock wait timed out"
                    );
                    return Err(LockError::Timeout {
                        path: path.to_path_buf(),
                        waited: started.elapsed(),
                    });
                }
                None => self.stale_after,
            };
            // Wake in time to reclaim a lock that goes stale while we wait.
            let wait = table
                .get(path)
                .map(|entry| entry.expires.saturating_duration_since(now))
                .map_or(remaining, |until_stale| remaining.min(until_stale))
                .max(Duration::from_millis(1));
            table = self
                .released
                .wait_timeout(table, wait)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Acquires the lock on `path` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] if another holder has the lock.
    pub fn try_acquire(&self, path: &Path) -> Result<LockGuard<'_>, LockError> {
        let mut table = self.table();
        self.evict_stale(&mut table);
        if let Some(entry) = table.get(path) {
            return Err(LockError::Held {
                path: path.to_path_buf(),
                holder: entry.token,
            });
        }
        let token = self.insert(&mut table, path);
        Ok(LockGuard::new(self, token, path))
    }

    /// Releases the lock identified by `token`.
    ///
    /// Returns whether a lock was released. Unknown, expired and already
    /// released tokens are ignored.
    pub fn release(&self, token: LockToken) -> bool {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, entry| entry.token != token);
        let released = table.len() != before;
        drop(table);
        if released {
            tracing::debug!(target: "folio::locks", token = %token, "lock released");
            self.released.notify_all();
        }
        released
    }

    /// Whether a live lock is held on `path`.
    #[must_use]
    pub fn is_locked(&self, path: &Path) -> bool {
        self.holder(path).is_some()
    }

    /// Whether `token` currently holds the lock on `path`.
    #[must_use]
    pub fn holds(&self, path: &Path, token: LockToken) -> bool {
        self.holder(path)
            .is_some_and(|lock| lock.holder_token == token)
    }

    /// Returns the live lock on `path`, if any.
    #[must_use]
    pub fn holder(&self, path: &Path) -> Option<Lock> {
        let table = self.table();
        let now = Instant::now();
        let stale_after = time::Duration::try_from(self.stale_after).unwrap_or(time::Duration::MAX);
        table
            .get(path)
            .filter(|entry| entry.expires > now)
            .map(|entry| Lock {
                file_path: path.to_path_buf(),
                holder_token: entry.token,
                acquired_at: entry.acquired_at,
                expires_at: entry
                    .acquired_at
                    .checked_add(stale_after)
                    .unwrap_or(entry.acquired_at),
            })
    }

    fn table(&self) -> MutexGuard<'_, HashMap<PathBuf, LockEntry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, table: &mut HashMap<PathBuf, LockEntry>, path: &Path) -> LockToken {
        let token = LockToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let now = Instant::now();
        let expires = now.checked_add(self.stale_after).unwrap_or(now);
        table.insert(
            path.to_path_buf(),
            LockEntry {
                token,
                expires,
                acquired_at: OffsetDateTime::now_utc(),
            },
        );
        tracing::debug!(
            target: "folio::locks",
            path = %path.display(),
            token = %token,
            "lock acquired"
        );
        token
    }

    fn evict_stale(&self, table: &mut HashMap<PathBuf, LockEntry>) {
        let now = Instant::now();
        table.retain(|path, entry| {
            let live = entry.expires > now;
            if !live {
                tracing::warn!(
                    target: "folio::locks",
                    path = %path.display(),
                    token = %entry.token,
                    stale_after_ms = self.stale_after.as_millis(),
                    "reclaiming stale lock"
                );
            }
            live
        });
    }
}

/// Releases its lock when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    token: LockToken,
    path: PathBuf,
    armed: bool,
}

impl<'a> LockGuard<'a> {
    fn new(manager: &'a LockManager, token: LockToken, path: &Path) -> Self {
        Self {
            manager,
            token,
            path: path.to_path_buf(),
            armed: true,
        }
    }

    /// The token identifying this lock.
    #[must_use]
    pub const fn token(&self) -> LockToken {
        self.token
    }

    /// The locked file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detaches the guard, leaving the lock held until
    /// [`LockManager::release`] is called with the returned token or the lock
    /// goes stale.
    #[must_use]
    pub fn into_token(mut self) -> LockToken {
        self.armed = false;
        self.token
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.release(self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn manager() -> LockManager {
        LockManager::new(Duration::from_secs(60))
    }

    #[rstest]
    fn guard_releases_on_drop(manager: LockManager) {
        let path = Path::new("/site/a.html");
        {
            let guard = manager.acquire(path, Duration::from_millis(10)).expect("acquire");
            assert!(manager.is_locked(path));
            assert!(manager.holds(path, guard.token()));
        }
        assert!(!manager.is_locked(path));
    }

    #[rstest]
    fn second_acquire_times_out(manager: LockManager) {
        let path = Path::new("/site/a.html");
        let _held = manager.acquire(path, Duration::from_millis(10)).expect("acquire");
        let error = manager
            .acquire(path, Duration::from_millis(50))
            .expect_err("should time out");
        assert!(matches!(
            error,
            LockError::Timeout { waited, .. } if waited >= Duration::from_millis(50)
        ));
    }

    #[rstest]
    fn different_files_do_not_contend(manager: LockManager) {
        let _a = manager
            .try_acquire(Path::new("/site/a.html"))
            .expect("a");
        assert!(manager.try_acquire(Path::new("/site/b.html")).is_ok());
    }

    #[rstest]
    fn try_acquire_reports_holder(manager: LockManager) {
        let path = Path::new("/site/a.html");
        let held = manager.try_acquire(path).expect("first");
        let error = manager.try_acquire(path).expect_err("second");
        assert_eq!(
            error,
            LockError::Held {
                path: path.to_path_buf(),
                holder: held.token()
            }
        );
    }

    #[rstest]
    fn release_is_idempotent_and_token_checked(manager: LockManager) {
        let path = Path::new("/site/a.html");
        let token = manager.try_acquire(path).expect("lock").into_token();
        assert!(manager.is_locked(path));
        assert!(!manager.release(LockToken(token.get() + 100)));
        assert!(manager.is_locked(path));
        assert!(manager.release(token));
        assert!(!manager.release(token));
        assert!(!manager.is_locked(path));
    }

    #[test]
    fn stale_locks_are_reclaimed() {
        let manager = LockManager::new(Duration::from_millis(20));
        let path = Path::new("/site/a.html");
        let abandoned = manager.try_acquire(path).expect("lock").into_token();
        let guard = manager
            .acquire(path, Duration::from_secs(2))
            .expect("reclaimed");
        assert_ne!(guard.token(), abandoned);
        assert!(!manager.release(abandoned));
        assert!(manager.holds(path, guard.token()));
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let manager = Arc::new(LockManager::new(Duration::from_secs(60)));
        let path = PathBuf::from("/site/a.html");
        let token = manager.try_acquire(&path).expect("lock").into_token();

        let waiter = {
            let manager = Arc::clone(&manager);
            let path = path.clone();
            thread::spawn(move || {
                manager
                    .acquire(&path, Duration::from_secs(5))
                    .map(LockGuard::into_token)
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(manager.release(token));
        let acquired = waiter.join().expect("join").expect("acquired");
        assert_ne!(acquired, token);
    }

    #[rstest]
    fn holder_reports_expiry(manager: LockManager) {
        let path = Path::new("/site/a.html");
        let guard = manager.try_acquire(path).expect("lock");
        let lock = manager.holder(path).expect("holder");
        assert_eq!(lock.holder_token, guard.token());
        assert_eq!(lock.expires_at - lock.acquired_at, time::Duration::seconds(60));
    }
}
