//! A watcher backend that observes nothing.
//!
//! `StubWatcher` enumerates directories but owns no kernel resources and
//! never produces events. It exists for one-shot crawls and for driving the
//! crawler deterministically in tests: callers enqueue pending items by
//! hand and drain them.

use std::path::Path;
use std::time::Duration;

use super::{ConsumeOutcome, DirHandle, Watcher};
use crate::error::Result;
use crate::pending::PendingCollection;

#[derive(Debug, Default)]
pub struct StubWatcher;

impl StubWatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Watcher for StubWatcher {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn start_watch_dir(&self, path: &Path) -> Result<DirHandle> {
        Ok(DirHandle::open(path)?)
    }

    fn stop_watch_dir(&self, _path: &Path) {}

    fn consume_notify(&self, _pending: &mut PendingCollection) -> Result<ConsumeOutcome> {
        Ok(ConsumeOutcome::default())
    }

    fn wait_notify(&self, timeout: Duration) -> Result<bool> {
        std::thread::sleep(timeout);
        Ok(false)
    }
}
