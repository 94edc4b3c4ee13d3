//! Filesystem watching.
//!
//! The crawler is abstract over the event source: any backend implementing
//! [`Watcher`] can feed it. The production backend is [`NotifyWatcher`],
//! built on the `notify` crate with one non-recursive watch per directory;
//! [`StubWatcher`] observes nothing and exists for deterministic pipelines
//! driven by hand (tests, one-shot crawls).

mod backend;
mod stub;

use std::io;
use std::path::Path;
use std::time::Duration;

pub use backend::NotifyWatcher;
pub use stub::StubWatcher;

use crate::error::Result;
use crate::pending::PendingCollection;
use crate::strings::StringRef;
use crate::view::FileKind;

/// One entry yielded by a directory enumeration.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: StringRef,
    pub kind: FileKind,
}

/// Readdir-style handle returned by [`Watcher::start_watch_dir`]; the
/// crawler uses it to enumerate the directory's contents as of the moment
/// the watch began.
#[derive(Debug)]
pub struct DirHandle {
    entries: Vec<DirEntryInfo>,
}

impl DirHandle {
    /// Snapshots the contents of `path`. Entry kinds come from the
    /// directory entry itself and do not follow symlinks.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let kind = entry
                .file_type()
                .map(FileKind::from)
                .unwrap_or(FileKind::Unknown);
            entries.push(DirEntryInfo {
                name: StringRef::from(entry.file_name().to_string_lossy().into_owned()),
                kind,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> impl Iterator<Item = &DirEntryInfo> {
        self.entries.iter()
    }
}

/// Result of draining the watcher's event queue once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumeOutcome {
    /// Whether any pending item was enqueued.
    pub progressed: bool,
    /// The kernel dropped events; the caller must schedule a recursive
    /// rescan of the root.
    pub lost_sync: bool,
}

/// Capability set a watcher backend provides to the crawler.
///
/// Construction is backend-specific and fails with `InitFailed` when
/// platform resources cannot be acquired.
pub trait Watcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begins observing `path` and returns a handle for enumerating its
    /// initial contents. Called with the tree write lock held.
    fn start_watch_dir(&self, path: &Path) -> Result<DirHandle>;

    /// Begins observing one file. On backends where directory watches
    /// subsume file watches this is a no-op.
    fn start_watch_file(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Releases per-directory resources for `path`.
    fn stop_watch_dir(&self, path: &Path);

    /// Drains available events into `pending`. Fails with `RootVanished`
    /// when the root itself was removed or renamed.
    fn consume_notify(&self, pending: &mut PendingCollection) -> Result<ConsumeOutcome>;

    /// Blocks up to `timeout` for new events; returns whether any are
    /// ready. Returns promptly on cancellation.
    fn wait_notify(&self, timeout: Duration) -> Result<bool>;
}
