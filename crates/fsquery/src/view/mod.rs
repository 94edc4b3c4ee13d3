//! In-memory view of watched subtrees.
//!
//! The view mirrors the structure of a filesystem subtree: a tree of
//! directories and files in arena storage, a global recency list ordered by
//! most recent observation, and per-suffix lists for cheap suffix queries.
//! The crawler mutates it under the write lock; query generators walk it
//! under the read lock.

pub mod arena;
pub mod crawl;
pub mod node;

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::lock::TimedRwLock;
use crate::strings::StringRef;

pub use arena::{Arena, DirId, FileId, OptionDirId, OptionFileId};
pub use node::{epoch_secs, ClockStamp, DirNode, FileKind, FileNode, FileStat};

/// Tree state guarded by the view's reader/writer lock.
#[derive(Debug)]
pub struct ViewState {
    root_path: PathBuf,
    pub(crate) dirs: Arena<DirId, DirNode>,
    pub(crate) files: Arena<FileId, FileNode>,
    root: DirId,
    latest_file: OptionFileId,
    suffixes: HashMap<StringRef, FileId>,
    last_age_out_tick: u32,
    last_age_out_timestamp: i64,
}

impl ViewState {
    fn new(root_path: PathBuf) -> Self {
        let mut dirs = Arena::new();
        let root = dirs.insert(DirNode::new(None, StringRef::new("")));
        Self {
            root_path,
            dirs,
            files: Arena::new(),
            root,
            latest_file: OptionFileId::none(),
            suffixes: HashMap::new(),
            last_age_out_tick: 0,
            last_age_out_timestamp: 0,
        }
    }

    #[inline]
    pub fn root(&self) -> DirId {
        self.root
    }

    #[inline]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Head of the recency list: the most recently changed file.
    #[inline]
    pub fn latest_file(&self) -> Option<FileId> {
        self.latest_file.to_option()
    }

    /// Head of the per-suffix list for a lowercase suffix.
    pub fn suffix_head(&self, suffix: &str) -> Option<FileId> {
        self.suffixes.get(suffix).copied()
    }

    #[inline]
    pub fn last_age_out_tick(&self) -> u32 {
        self.last_age_out_tick
    }

    #[inline]
    pub fn last_age_out_timestamp(&self) -> i64 {
        self.last_age_out_timestamp
    }

    /// Converts an absolute or root-relative path into the view's
    /// slash-separated relative form. Fails when the path escapes the root.
    pub fn rel_of(&self, path: &Path) -> Result<String> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root_path).map_err(|_| {
                Error::InvalidPath(format!(
                    "{} is outside of root {}",
                    path.display(),
                    self.root_path.display()
                ))
            })?
        } else {
            path
        };

        let mut out = String::new();
        for comp in rel.components() {
            match comp {
                Component::Normal(name) => {
                    if !out.is_empty() {
                        out.push('/');
                    }
                    out.push_str(&name.to_string_lossy());
                }
                Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidPath(format!(
                        "{} escapes the watched root",
                        path.display()
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Resolves a relative path to a directory, if known.
    pub fn resolve_dir(&self, rel: &str) -> Option<DirId> {
        let mut cur = self.root;
        for seg in rel.split('/') {
            if seg.is_empty() || seg == "." {
                continue;
            }
            if seg == ".." {
                return None;
            }
            cur = *self.dirs[cur].dirs.get(seg)?;
        }
        Some(cur)
    }

    /// Resolves a relative path to a directory, inserting missing
    /// intermediate directories.
    pub fn resolve_dir_create(&mut self, rel: &str) -> Result<DirId> {
        let mut cur = self.root;
        for seg in rel.split('/') {
            if seg.is_empty() || seg == "." {
                continue;
            }
            if seg == ".." {
                return Err(Error::InvalidPath(format!(
                    "{rel} escapes the watched root"
                )));
            }
            cur = match self.dirs[cur].dirs.get(seg) {
                Some(&child) => child,
                None => {
                    let name = StringRef::new(seg);
                    let child = self.dirs.insert(DirNode::new(Some(cur), name.clone()));
                    self.dirs[cur].dirs.insert(name, child);
                    child
                }
            };
        }
        Ok(cur)
    }

    /// Resolves a relative path to a file entry, if known.
    pub fn resolve_file(&self, rel: &str) -> Option<FileId> {
        let (dir_rel, name) = rel.rsplit_once('/').unwrap_or(("", rel));
        if name.is_empty() {
            return None;
        }
        let dir = self.resolve_dir(dir_rel)?;
        self.dirs[dir].files.get(name).copied()
    }

    /// Path of `dir` relative to the root, slash-separated. The root itself
    /// is the empty string.
    pub fn dir_rel_path(&self, dir: DirId) -> String {
        let mut segs = Vec::new();
        let mut cur = Some(dir);
        while let Some(d) = cur {
            let node = &self.dirs[d];
            if node.parent().is_none() {
                break;
            }
            segs.push(node.name.as_str().to_string());
            cur = node.parent();
        }
        segs.reverse();
        segs.join("/")
    }

    /// Filesystem path of `dir`.
    pub fn dir_fs_path(&self, dir: DirId) -> PathBuf {
        let rel = self.dir_rel_path(dir);
        if rel.is_empty() {
            self.root_path.clone()
        } else {
            self.root_path.join(rel)
        }
    }

    /// Returns the file named `name` under `dir`, creating it if absent.
    ///
    /// A newly created file starts with `exists = false` (pending its first
    /// stat), its creation clock at the current tick, and is linked at the
    /// head of the recency list and into its suffix list.
    pub fn get_or_create_child_file(
        &mut self,
        dir: DirId,
        name: &str,
        now: i64,
        tick: u32,
    ) -> FileId {
        if let Some(&fid) = self.dirs[dir].files.get(name) {
            return fid;
        }
        let name = StringRef::new(name);
        let stamp = ClockStamp {
            ticks: tick,
            timestamp: now,
        };
        let fid = self.files.insert(FileNode::new(dir, name.clone(), stamp));
        self.dirs[dir].files.insert(name, fid);
        self.insert_at_head(fid);
        self.link_suffix(fid);
        fid
    }

    /// Stamps a new observation on `file` and bubbles it to the head of the
    /// recency list. Idempotent when the file is already at the head.
    pub fn mark_file_changed(&mut self, file: FileId, now: i64, tick: u32) {
        {
            let node = &mut self.files[file];
            node.otime = ClockStamp {
                ticks: tick,
                timestamp: now,
            };
        }
        if self.latest_file.to_option() != Some(file) {
            self.unlink_recency(file);
            self.insert_at_head(file);
        }
    }

    /// Marks `dir` as removed: every existing child file is marked deleted
    /// and stamped. With `recursive`, child directories are marked too.
    pub fn mark_dir_deleted(&mut self, dir: DirId, now: i64, tick: u32, recursive: bool) {
        self.dirs[dir].exists = false;
        let files: Vec<FileId> = self.dirs[dir].files.values().copied().collect();
        for fid in files {
            if self.files[fid].exists {
                self.files[fid].exists = false;
                self.mark_file_changed(fid, now, tick);
            }
        }
        if recursive {
            let children: Vec<DirId> = self.dirs[dir].dirs.values().copied().collect();
            for child in children {
                if self.dirs[child].exists {
                    self.mark_dir_deleted(child, now, tick, true);
                }
            }
        }
    }

    /// Removes deleted files whose last observation is at least `min_age`
    /// old, then any directories left empty and deleted.
    pub fn age_out(&mut self, now: i64, min_age: Duration, tick: u32) {
        let min_age = min_age.as_secs() as i64;

        let mut victims = Vec::new();
        let mut cursor = self.latest_file.to_option();
        while let Some(fid) = cursor {
            let node = &self.files[fid];
            cursor = node.recency_next.to_option();
            if !node.exists && node.otime.timestamp + min_age <= now {
                victims.push(fid);
            }
        }

        let removed = victims.len();
        let mut touched: HashSet<DirId> = HashSet::new();
        for fid in victims {
            self.unlink_recency(fid);
            self.unlink_suffix(fid);
            if let Some(node) = self.files.remove(fid) {
                self.dirs[node.parent].files.remove(&node.name);
                touched.insert(node.parent);
            }
        }

        for dir in touched {
            self.prune_empty_deleted(dir);
        }

        self.last_age_out_tick = tick;
        self.last_age_out_timestamp = now;
        if removed > 0 {
            tracing::debug!(removed, root = %self.root_path.display(), "aged out deleted files");
        }
    }

    /// Walks up from `dir` removing directories that no longer exist and
    /// have no remaining children.
    fn prune_empty_deleted(&mut self, dir: DirId) {
        let mut cur = Some(dir);
        while let Some(d) = cur {
            if d == self.root || self.dirs.get(d).is_none() {
                break;
            }
            let (removable, parent) = {
                let node = &self.dirs[d];
                (
                    !node.exists && node.files.is_empty() && node.dirs.is_empty(),
                    node.parent(),
                )
            };
            if !removable {
                break;
            }
            if let Some(p) = parent {
                let name = self.dirs[d].name.clone();
                self.dirs[p].dirs.remove(&name);
            }
            self.dirs.remove(d);
            cur = parent;
        }
    }

    fn insert_at_head(&mut self, fid: FileId) {
        let old_head = self.latest_file;
        {
            let node = &mut self.files[fid];
            node.recency_prev = OptionFileId::none();
            node.recency_next = old_head;
        }
        if let Some(head) = old_head.to_option() {
            self.files[head].recency_prev = OptionFileId::some(fid);
        }
        self.latest_file = OptionFileId::some(fid);
    }

    fn unlink_recency(&mut self, fid: FileId) {
        let (prev, next) = {
            let node = &self.files[fid];
            (node.recency_prev, node.recency_next)
        };
        match prev.to_option() {
            Some(p) => self.files[p].recency_next = next,
            None => {
                if self.latest_file.to_option() == Some(fid) {
                    self.latest_file = next;
                }
            }
        }
        if let Some(n) = next.to_option() {
            self.files[n].recency_prev = prev;
        }
        let node = &mut self.files[fid];
        node.recency_prev = OptionFileId::none();
        node.recency_next = OptionFileId::none();
    }

    fn link_suffix(&mut self, fid: FileId) {
        let Some(key) = self.files[fid].suffix.clone() else {
            return;
        };
        let old_head = self.suffixes.get(&key).copied();
        {
            let node = &mut self.files[fid];
            node.suffix_prev = OptionFileId::none();
            node.suffix_next = OptionFileId::from_option(old_head);
        }
        if let Some(head) = old_head {
            self.files[head].suffix_prev = OptionFileId::some(fid);
        }
        self.suffixes.insert(key, fid);
    }

    fn unlink_suffix(&mut self, fid: FileId) {
        let Some(key) = self.files[fid].suffix.clone() else {
            return;
        };
        let (prev, next) = {
            let node = &self.files[fid];
            (node.suffix_prev, node.suffix_next)
        };
        match prev.to_option() {
            Some(p) => self.files[p].suffix_next = next,
            None => match next.to_option() {
                Some(n) => {
                    self.suffixes.insert(key, n);
                }
                None => {
                    self.suffixes.remove(&key);
                }
            },
        }
        if let Some(n) = next.to_option() {
            self.files[n].suffix_prev = prev;
        }
        let node = &mut self.files[fid];
        node.suffix_prev = OptionFileId::none();
        node.suffix_next = OptionFileId::none();
    }
}

/// Keeps track of the state of the filesystem in memory.
///
/// Owns the tree behind a timed reader/writer lock, the monotonic tick
/// counter, the per-watch-session root number, and the named cursor map.
#[derive(Debug)]
pub struct InMemoryView {
    state: TimedRwLock<ViewState>,
    most_recent_tick: AtomicU32,
    root_number: AtomicU32,
    cursors: Mutex<HashMap<String, u32>>,
    root_path: PathBuf,
}

impl InMemoryView {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        Self {
            state: TimedRwLock::new(ViewState::new(root_path.clone())),
            most_recent_tick: AtomicU32::new(0),
            root_number: AtomicU32::new(1),
            cursors: Mutex::new(HashMap::new()),
            root_path,
        }
    }

    #[inline]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// The most recently observed tick value of an item in the view.
    #[inline]
    pub fn most_recent_tick(&self) -> u32 {
        self.most_recent_tick.load(Ordering::Acquire)
    }

    pub(crate) fn store_tick(&self, tick: u32) {
        self.most_recent_tick.store(tick, Ordering::Release);
    }

    /// Per-watch-session identifier; changes when the root is recrawled.
    #[inline]
    pub fn root_number(&self) -> u32 {
        self.root_number.load(Ordering::Acquire)
    }

    pub(crate) fn bump_root_number(&self) {
        self.root_number.fetch_add(1, Ordering::AcqRel);
    }

    /// Acquires the shared side of the tree lock within `timeout`.
    pub fn read_for(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, ViewState>> {
        self.state.read_for(timeout)
    }

    /// Acquires the exclusive side of the tree lock within `timeout`.
    pub fn write_for(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, ViewState>> {
        self.state.write_for(timeout)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ViewState> {
        self.state.write()
    }

    /// Ages out deleted files older than `min_age` under the write lock.
    pub fn age_out(&self, min_age: Duration) {
        let mut state = self.state.write();
        let now = epoch_secs(SystemTime::now());
        let tick = self.most_recent_tick();
        state.age_out(now, min_age, tick);
    }

    pub(crate) fn cursor_get(&self, name: &str) -> Option<u32> {
        self.cursors.lock().get(name).copied()
    }

    pub(crate) fn cursor_set(&self, name: &str, ticks: u32) {
        self.cursors.lock().insert(name.to_string(), ticks);
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Checks the structural invariants of a view state:
    /// the recency list is a permutation of all files in non-increasing
    /// `otime` order, parent child-maps point back at their files, and
    /// suffix lists only hold files with that suffix.
    pub fn assert_invariants(state: &ViewState) {
        // Recency list is a permutation of the file arena.
        let mut seen = std::collections::HashSet::new();
        let mut cursor = state.latest_file();
        let mut last_ticks = u32::MAX;
        while let Some(fid) = cursor {
            let node = &state.files[fid];
            assert!(seen.insert(fid), "recency list visits {fid:?} twice");
            assert!(
                node.otime.ticks <= last_ticks,
                "recency list out of order at {:?}",
                node.name
            );
            last_ticks = node.otime.ticks;
            cursor = node.recency_next.to_option();
        }
        assert_eq!(seen.len(), state.files.len(), "recency list misses files");

        // Parent maps are consistent.
        for (fid, node) in state.files.iter() {
            assert_eq!(
                state.dirs[node.parent].files.get(&node.name).copied(),
                Some(fid),
                "parent map does not point back at {:?}",
                node.name
            );
        }

        // Suffix lists hold matching files only.
        for (suffix, &head) in &state.suffixes {
            let mut cursor = Some(head);
            while let Some(fid) = cursor {
                let node = &state.files[fid];
                assert_eq!(
                    node.suffix.as_ref(),
                    Some(suffix),
                    "file {:?} linked under wrong suffix {suffix}",
                    node.name
                );
                cursor = node.suffix_next.to_option();
            }
        }
    }
}
