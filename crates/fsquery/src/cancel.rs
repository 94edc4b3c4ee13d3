//! Cancellation flag for a watched root.
//!
//! Cancellation is cooperative: the watcher checks the flag on every
//! `consume_notify` call, the crawler between pending items, and query
//! generators at each step.
//!
//! ## Sparse Checking
//!
//! For tight loops over large trees, `check_sparse()` only performs the
//! atomic read every 65,536 iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// How often long-running loops should check whether the root was cancelled.
/// Using a power of 2 allows efficient modulo via bitwise AND.
pub const CANCEL_CHECK_INTERVAL: usize = 0x10000; // 65,536

/// Shared cancellation flag, one per watched root.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the root as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` once the flag is set, for use with `?`.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sparse check: only reads the flag every `CANCEL_CHECK_INTERVAL`
    /// iterations of the supplied counter.
    #[inline]
    pub fn check_sparse(&self, counter: usize) -> Result<()> {
        if counter & (CANCEL_CHECK_INTERVAL - 1) == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flag_is_not_cancelled() {
        let flag = CancelFlag::new();
        assert!(flag.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        flag.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(other.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn sparse_check_skips_off_interval_counters() {
        let flag = CancelFlag::new();
        flag.cancel();
        // Off-interval counters do not observe the flag.
        assert!(flag.check_sparse(1).is_ok());
        assert!(flag.check_sparse(CANCEL_CHECK_INTERVAL - 1).is_ok());
        // Interval boundaries do.
        assert!(flag.check_sparse(0).is_err());
        assert!(flag.check_sparse(CANCEL_CHECK_INTERVAL).is_err());
    }
}
