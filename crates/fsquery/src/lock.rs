//! Timed shared/exclusive lock over the tree store.
//!
//! The crawler holds the write side for the duration of one drain cycle;
//! query generators hold the read side for the duration of a query. Both
//! acquisitions take a caller-supplied deadline and fail with
//! [`Error::LockTimeout`] rather than blocking indefinitely.

use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};

/// Reader/writer lock with timed acquisition.
#[derive(Debug, Default)]
pub struct TimedRwLock<T> {
    inner: RwLock<T>,
}

impl<T> TimedRwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Acquires the shared side, waiting up to `timeout`.
    pub fn read_for(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, T>> {
        self.inner
            .try_read_for(timeout)
            .ok_or(Error::LockTimeout("read"))
    }

    /// Acquires the exclusive side, waiting up to `timeout`.
    pub fn write_for(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>> {
        self.inner
            .try_write_for(timeout)
            .ok_or(Error::LockTimeout("write"))
    }

    /// Blocking exclusive acquisition, for paths with no caller deadline
    /// (the crawler's own drain cycle).
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn read_times_out_while_writer_held() {
        let lock = Arc::new(TimedRwLock::new(0u32));
        let held = lock.clone();
        let guard = held.write();

        let contender = lock.clone();
        let handle = thread::spawn(move || {
            contender
                .read_for(Duration::from_millis(10))
                .err()
                .map(|e| e.to_string())
        });
        let err = handle.join().unwrap().expect("read should time out");
        assert!(err.contains("lock timeout"));
        drop(guard);
    }

    #[test]
    fn read_succeeds_after_writer_releases() {
        let lock = TimedRwLock::new(7u32);
        {
            let mut guard = lock.write();
            *guard = 8;
        }
        let guard = lock.read_for(Duration::from_millis(100)).unwrap();
        assert_eq!(*guard, 8);
    }

    #[test]
    fn concurrent_readers_share() {
        let lock = TimedRwLock::new(());
        let a = lock.read_for(Duration::from_millis(10)).unwrap();
        let b = lock.read_for(Duration::from_millis(10)).unwrap();
        drop((a, b));
    }
}
