//! Watcher backend built on the `notify` crate.
//!
//! One non-recursive watch is registered per directory, mirroring the
//! kernel-level model (inotify watch descriptors, kqueue per-directory
//! vnodes). The registration map is guarded by its own mutex, independent
//! of the tree lock; a path is inserted into the map *before* the kernel
//! registration is issued so an event dequeued immediately afterward finds
//! its path.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;

use super::{ConsumeOutcome, DirHandle, Watcher};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pending::{PendingCollection, PendingFlags};

type EventResult = notify::Result<notify::Event>;

pub struct NotifyWatcher {
    root: PathBuf,
    batch_limit: usize,
    watcher: Mutex<RecommendedWatcher>,
    /// Watched directory paths; the descriptor-to-path concern of the
    /// kernel backends collapses to path identity here.
    watched: Mutex<HashSet<PathBuf>>,
    rx: Receiver<EventResult>,
    /// Events pulled off the channel by `wait_notify`, awaiting the next
    /// `consume_notify`.
    buffered: Mutex<VecDeque<EventResult>>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("root", &self.root)
            .field("watched", &self.watched.lock().len())
            .finish()
    }
}

impl NotifyWatcher {
    /// Acquires the platform event source for `root`.
    pub fn new(root: &Path, config: &Config) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |event: EventResult| {
            let _ = tx.send(event);
        })
        .map_err(|err| {
            Error::InitFailed(format!("watch({}): {err}", root.display()))
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            batch_limit: config.notify_batch_limit(),
            watcher: Mutex::new(watcher),
            watched: Mutex::new(HashSet::with_capacity(config.hint_num_dirs())),
            rx,
            buffered: Mutex::new(VecDeque::new()),
        })
    }

    fn unregister(&self, path: &Path) {
        self.watched.lock().remove(path);
        // The kernel may already have dropped the watch with the directory;
        // an unwatch failure here carries no information.
        let _ = self.watcher.lock().unwatch(path);
    }

    fn next_event(&self) -> Option<EventResult> {
        if let Some(event) = self.buffered.lock().pop_front() {
            return Some(event);
        }
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Maps one event path to pending work. Returns whether anything was
    /// enqueued.
    fn map_event_path(
        &self,
        kind: &EventKind,
        path: &Path,
        now: SystemTime,
        pending: &mut PendingCollection,
    ) -> Result<bool> {
        let removal = is_removal(kind);
        if path == self.root && removal {
            tracing::error!(root = %self.root.display(), "root has been (re)moved, cancelling watch");
            return Err(Error::RootVanished(self.root.clone()));
        }

        let (is_watched_dir, parent_watched) = {
            let watched = self.watched.lock();
            (
                watched.contains(path),
                path.parent().is_some_and(|p| watched.contains(p)),
            )
        };

        if is_watched_dir && removal {
            // The directory is gone or renamed away; drop its registration
            // and have the crawler re-examine the subtree.
            self.unregister(path);
            pending.add(path, now, PendingFlags::VIA_NOTIFY | PendingFlags::RECURSIVE);
            return Ok(true);
        }

        if is_watched_dir || parent_watched {
            pending.add(path, now, PendingFlags::VIA_NOTIFY);
            return Ok(true);
        }

        // Stale event after unregister: no mapping to a known path.
        tracing::debug!(path = %path.display(), ?kind, "dropping event with no watched mapping");
        Ok(false)
    }
}

impl Watcher for NotifyWatcher {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn start_watch_dir(&self, path: &Path) -> Result<DirHandle> {
        // Strict open first, so enumeration reflects a directory we can
        // actually read.
        let handle = DirHandle::open(path)?;

        self.watched.lock().insert(path.to_path_buf());
        if let Err(err) = self
            .watcher
            .lock()
            .watch(path, RecursiveMode::NonRecursive)
        {
            self.watched.lock().remove(path);
            return Err(watch_error(path, err));
        }
        tracing::debug!(path = %path.display(), "watching directory");
        Ok(handle)
    }

    fn stop_watch_dir(&self, path: &Path) {
        self.unregister(path);
    }

    fn consume_notify(&self, pending: &mut PendingCollection) -> Result<ConsumeOutcome> {
        let now = SystemTime::now();
        let mut outcome = ConsumeOutcome::default();

        for _ in 0..self.batch_limit {
            let Some(event) = self.next_event() else {
                break;
            };
            match event {
                Ok(event) => {
                    if event.need_rescan() {
                        // Kernel queue overflowed; events were dropped.
                        tracing::warn!(root = %self.root.display(), "event queue overflow, recrawl needed");
                        outcome.lost_sync = true;
                        continue;
                    }
                    for path in &event.paths {
                        outcome.progressed |=
                            self.map_event_path(&event.kind, path, now, pending)?;
                    }
                }
                Err(err) => {
                    tracing::warn!(root = %self.root.display(), %err, "watcher error, recrawl needed");
                    outcome.lost_sync = true;
                }
            }
        }
        Ok(outcome)
    }

    fn wait_notify(&self, timeout: Duration) -> Result<bool> {
        if !self.buffered.lock().is_empty() {
            return Ok(true);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.buffered.lock().push_back(event);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }
}

fn is_removal(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From))
    )
}

fn watch_error(path: &Path, err: notify::Error) -> Error {
    match err.kind {
        notify::ErrorKind::Io(io) => Error::Io(io),
        notify::ErrorKind::PathNotFound => Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )),
        other => Error::InitFailed(format!("watch({}): {other:?}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};

    fn watcher_for(root: &Path) -> NotifyWatcher {
        NotifyWatcher::new(root, &Config::new()).expect("init watcher")
    }

    #[test]
    fn event_on_watched_dir_enqueues_via_notify() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = watcher_for(tmp.path());
        watcher.watched.lock().insert(tmp.path().join("sub"));

        let mut pending = PendingCollection::new();
        let enqueued = watcher
            .map_event_path(
                &EventKind::Create(CreateKind::File),
                &tmp.path().join("sub/new.txt"),
                SystemTime::now(),
                &mut pending,
            )
            .unwrap();
        assert!(enqueued);
        let item = pending.pop().unwrap();
        assert_eq!(item.path, tmp.path().join("sub/new.txt"));
        assert_eq!(item.flags, PendingFlags::VIA_NOTIFY);
    }

    #[test]
    fn removal_of_watched_dir_goes_recursive_and_unregisters() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = watcher_for(tmp.path());
        let sub = tmp.path().join("sub");
        watcher.watched.lock().insert(sub.clone());

        let mut pending = PendingCollection::new();
        watcher
            .map_event_path(
                &EventKind::Remove(RemoveKind::Folder),
                &sub,
                SystemTime::now(),
                &mut pending,
            )
            .unwrap();
        let item = pending.pop().unwrap();
        assert!(item.flags.contains(PendingFlags::RECURSIVE));
        assert!(!watcher.watched.lock().contains(&sub));
    }

    #[test]
    fn stale_events_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = watcher_for(tmp.path());
        let mut pending = PendingCollection::new();
        let enqueued = watcher
            .map_event_path(
                &EventKind::Create(CreateKind::File),
                Path::new("/nowhere/known/file"),
                SystemTime::now(),
                &mut pending,
            )
            .unwrap();
        assert!(!enqueued);
        assert!(pending.is_empty());
    }

    #[test]
    fn root_removal_surfaces_root_vanished() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = watcher_for(tmp.path());
        let mut pending = PendingCollection::new();
        let err = watcher
            .map_event_path(
                &EventKind::Remove(RemoveKind::Folder),
                tmp.path(),
                SystemTime::now(),
                &mut pending,
            )
            .unwrap_err();
        assert!(matches!(err, Error::RootVanished(_)));
    }

    #[test]
    fn start_watch_dir_registers_and_enumerates() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();

        let watcher = watcher_for(tmp.path());
        let handle = watcher.start_watch_dir(tmp.path()).unwrap();
        assert!(watcher.watched.lock().contains(tmp.path()));

        let mut names: Vec<String> = handle
            .entries()
            .map(|e| e.name.as_str().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);
    }
}
