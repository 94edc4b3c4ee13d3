//! Coalescing work queue of paths awaiting crawler reconciliation.
//!
//! Items with the same path coalesce: the flag sets union and the newest
//! observation time wins. Dequeue order is first-insertion order.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

bitflags::bitflags! {
    /// Flags attached to a pending path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PendingFlags: u8 {
        /// Scan the whole subtree beneath the path, not just the entry.
        const RECURSIVE = 0b01;
        /// The item originated from the watcher rather than a crawl.
        const VIA_NOTIFY = 0b10;
    }
}

/// One unit of crawler work.
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub path: PathBuf,
    pub now: SystemTime,
    pub flags: PendingFlags,
}

/// Insertion-ordered coalescing collection of pending items.
#[derive(Debug, Default)]
pub struct PendingCollection {
    order: VecDeque<PathBuf>,
    items: HashMap<PathBuf, (SystemTime, PendingFlags)>,
}

impl PendingCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `path`, coalescing with any queued item for the same path.
    pub fn add(&mut self, path: &Path, now: SystemTime, flags: PendingFlags) {
        match self.items.get_mut(path) {
            Some((queued_now, queued_flags)) => {
                *queued_flags |= flags;
                if now > *queued_now {
                    *queued_now = now;
                }
            }
            None => {
                self.order.push_back(path.to_path_buf());
                self.items.insert(path.to_path_buf(), (now, flags));
            }
        }
    }

    /// Removes and returns the oldest queued item.
    pub fn pop(&mut self) -> Option<PendingItem> {
        let path = self.order.pop_front()?;
        let (now, flags) = self
            .items
            .remove(&path)
            .expect("queued path must have a coalesced entry");
        Some(PendingItem { path, now, flags })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Discards all queued work. Used when a recrawl supersedes it.
    pub fn clear(&mut self) {
        self.order.clear();
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn dequeue_preserves_insertion_order() {
        let mut coll = PendingCollection::new();
        coll.add(Path::new("/r/a"), t(1), PendingFlags::VIA_NOTIFY);
        coll.add(Path::new("/r/b"), t(2), PendingFlags::VIA_NOTIFY);
        assert_eq!(coll.pop().unwrap().path, PathBuf::from("/r/a"));
        assert_eq!(coll.pop().unwrap().path, PathBuf::from("/r/b"));
        assert!(coll.pop().is_none());
    }

    #[test]
    fn same_path_coalesces_flags_and_newest_time() {
        let mut coll = PendingCollection::new();
        coll.add(Path::new("/r/a"), t(5), PendingFlags::VIA_NOTIFY);
        coll.add(Path::new("/r/a"), t(9), PendingFlags::RECURSIVE);
        coll.add(Path::new("/r/a"), t(2), PendingFlags::empty());

        assert_eq!(coll.len(), 1);
        let item = coll.pop().unwrap();
        assert_eq!(item.now, t(9));
        assert_eq!(item.flags, PendingFlags::VIA_NOTIFY | PendingFlags::RECURSIVE);
    }

    #[test]
    fn clear_discards_everything() {
        let mut coll = PendingCollection::new();
        coll.add(Path::new("/r/a"), t(1), PendingFlags::RECURSIVE);
        coll.clear();
        assert!(coll.is_empty());
        assert!(coll.pop().is_none());
    }
}
