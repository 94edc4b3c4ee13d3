//! A watched root: the in-memory view plus the dedicated I/O thread that
//! runs the watcher→crawler loop for one filesystem subtree.
//!
//! The loop drains watcher events into the pending collection, reconciles
//! them against the view under the write lock, and then blocks in
//! `wait_notify`. Losing sync with the kernel (queue overflow) triggers a
//! recrawl: pending work is discarded, the watcher is re-initialized, the
//! root number is bumped so cursors from the previous incarnation read as
//! fresh-instance, and the root is enqueued recursively.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pending::{PendingCollection, PendingFlags};
use crate::query::{execute, Query, QueryResult};
use crate::view::crawl::process_pending;
use crate::view::InMemoryView;
use crate::watcher::{NotifyWatcher, Watcher};

/// How long the I/O thread parks in `wait_notify` between drains.
const WAIT_NOTIFY_INTERVAL: Duration = Duration::from_millis(100);

/// Constructs a fresh watcher backend; invoked again on recrawl.
pub type WatcherFactory = Box<dyn Fn(&Path, &Config) -> Result<Box<dyn Watcher>> + Send>;

#[derive(Debug, Default)]
struct CrawlStatus {
    pending: usize,
    cycles: u64,
}

struct RootShared {
    view: InMemoryView,
    cancel: CancelFlag,
    vanished: AtomicBool,
    status: Mutex<CrawlStatus>,
    status_cond: Condvar,
}

/// A watched filesystem root.
pub struct WatchedRoot {
    shared: Arc<RootShared>,
    io_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WatchedRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedRoot")
            .field("root", &self.shared.view.root_path())
            .finish()
    }
}

impl WatchedRoot {
    /// Starts watching `root_path` with the platform watcher backend.
    pub fn new(root_path: impl Into<PathBuf>, config: Config) -> Result<Self> {
        Self::with_watcher_factory(
            root_path,
            config,
            Box::new(|root, config| {
                NotifyWatcher::new(root, config).map(|w| Box::new(w) as Box<dyn Watcher>)
            }),
        )
    }

    /// Starts watching with a caller-supplied watcher backend factory.
    pub fn with_watcher_factory(
        root_path: impl Into<PathBuf>,
        config: Config,
        factory: WatcherFactory,
    ) -> Result<Self> {
        let root_path = root_path.into();
        let meta = std::fs::metadata(&root_path)
            .map_err(|err| Error::InitFailed(format!("{}: {err}", root_path.display())))?;
        if !meta.is_dir() {
            return Err(Error::InitFailed(format!(
                "{} is not a directory",
                root_path.display()
            )));
        }

        let shared = Arc::new(RootShared {
            view: InMemoryView::new(root_path.clone()),
            cancel: CancelFlag::new(),
            vanished: AtomicBool::new(false),
            status: Mutex::new(CrawlStatus::default()),
            status_cond: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let thread_config = config;
        let io_thread = std::thread::Builder::new()
            .name(format!("fsquery-io {}", root_path.display()))
            .spawn(move || io_thread(thread_shared, thread_config, factory))
            .map_err(|err| Error::InitFailed(format!("failed to spawn io thread: {err}")))?;

        Ok(Self {
            shared,
            io_thread: Some(io_thread),
        })
    }

    pub fn view(&self) -> &InMemoryView {
        &self.shared.view
    }

    pub fn root_path(&self) -> &Path {
        self.shared.view.root_path()
    }

    /// Evaluates a query against this root. With a non-zero `sync_timeout`
    /// the call first waits for in-flight notifications to settle.
    pub fn query(&self, query: &Query) -> Result<QueryResult> {
        if self.shared.vanished.load(Ordering::Acquire) {
            return Err(Error::RootVanished(self.root_path().to_path_buf()));
        }
        if !query.sync_timeout.is_zero() {
            self.sync_to_now(query.sync_timeout)?;
        }
        execute(&self.shared.view, query, &self.shared.cancel)
    }

    /// Removes deleted entries older than `min_age` from the view.
    pub fn age_out(&self, min_age: Duration) {
        self.shared.view.age_out(min_age);
    }

    /// Waits until the crawler has completed a cycle with an empty pending
    /// queue, up to `timeout`.
    pub fn sync_to_now(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut status = self.shared.status.lock();
        let entry_cycles = status.cycles;
        loop {
            if self.shared.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if status.cycles > entry_cycles && status.pending == 0 {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::SyncTimeout);
            }
            if self
                .shared
                .status_cond
                .wait_until(&mut status, deadline)
                .timed_out()
            {
                return Err(Error::SyncTimeout);
            }
        }
    }

    /// Cancels the watch. Queries and the I/O thread observe the flag
    /// promptly.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Drop for WatchedRoot {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

fn io_thread(shared: Arc<RootShared>, config: Config, factory: WatcherFactory) {
    let root_path = shared.view.root_path().to_path_buf();
    let mut watcher = match factory(&root_path, &config) {
        Ok(watcher) => watcher,
        Err(err) => {
            tracing::error!(root = %root_path.display(), %err, "watcher init failed");
            shared.cancel.cancel();
            notify_status(&shared, 0);
            return;
        }
    };
    tracing::info!(root = %root_path.display(), watcher = watcher.name(), "watching root");

    let mut pending = PendingCollection::new();
    pending.add(&root_path, SystemTime::now(), PendingFlags::RECURSIVE);

    while !shared.cancel.is_cancelled() {
        match watcher.consume_notify(&mut pending) {
            Ok(outcome) if outcome.lost_sync => {
                match recrawl(&shared, &config, &factory, &mut pending, &root_path) {
                    Some(next) => watcher = next,
                    None => break,
                }
            }
            Ok(_) => {}
            Err(Error::RootVanished(_)) => {
                shared.vanished.store(true, Ordering::Release);
                shared.cancel.cancel();
                break;
            }
            Err(err) => {
                tracing::warn!(root = %root_path.display(), %err, "consume_notify failed");
            }
        }

        if !pending.is_empty() {
            match process_pending(&shared.view, watcher.as_ref(), &mut pending, &shared.cancel) {
                Ok(_) => {}
                Err(Error::RootVanished(_)) => {
                    shared.vanished.store(true, Ordering::Release);
                    shared.cancel.cancel();
                    break;
                }
                Err(Error::Cancelled) => break,
                Err(err) => {
                    tracing::warn!(root = %root_path.display(), %err, "crawl failed");
                }
            }
        }

        notify_status(&shared, pending.len());

        if let Err(err) = watcher.wait_notify(WAIT_NOTIFY_INTERVAL) {
            tracing::warn!(root = %root_path.display(), %err, "wait_notify failed");
        }
    }

    notify_status(&shared, pending.len());
    tracing::info!(root = %root_path.display(), "watch stopped");
}

/// Discards queued work, re-initializes the watcher, and schedules a full
/// recursive crawl under a new root number.
fn recrawl(
    shared: &RootShared,
    config: &Config,
    factory: &WatcherFactory,
    pending: &mut PendingCollection,
    root_path: &Path,
) -> Option<Box<dyn Watcher>> {
    tracing::warn!(root = %root_path.display(), "recrawling");
    pending.clear();
    shared.view.bump_root_number();
    match factory(root_path, config) {
        Ok(watcher) => {
            pending.add(root_path, SystemTime::now(), PendingFlags::RECURSIVE);
            Some(watcher)
        }
        Err(err) => {
            tracing::error!(root = %root_path.display(), %err, "watcher re-init failed");
            shared.cancel.cancel();
            None
        }
    }
}

fn notify_status(shared: &RootShared, pending: usize) {
    let mut status = shared.status.lock();
    status.pending = pending;
    status.cycles += 1;
    shared.status_cond.notify_all();
}
