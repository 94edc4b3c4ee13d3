//! The crawler: drains the pending collection and reconciles the view.
//!
//! One drain cycle runs under a single write-lock acquisition and stamps
//! every touched file with the same tick; the tick counter advances once at
//! the end of a cycle that observed any change. Directory items enumerate
//! their entries and feed the queue, so a recursive crawl unfolds through
//! the pending collection rather than the call stack.

use std::fs;
use std::io;
use std::path::Path;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::pending::{PendingCollection, PendingFlags, PendingItem};
use crate::watcher::Watcher;

use super::node::epoch_secs;
use super::{FileKind, FileStat, InMemoryView, ViewState};

/// Drains `pending` against the view, returning whether any change was
/// observed. Holds the tree write lock for the whole cycle.
pub(crate) fn process_pending(
    view: &InMemoryView,
    watcher: &dyn Watcher,
    pending: &mut PendingCollection,
    cancel: &CancelFlag,
) -> Result<bool> {
    if pending.is_empty() {
        return Ok(false);
    }
    let mut state = view.write();
    let tick = view.most_recent_tick().wrapping_add(1);
    let mut changed = false;
    let mut processed = 0usize;

    while let Some(item) = pending.pop() {
        cancel.check()?;
        changed |= crawl_item(&mut state, watcher, pending, &item, tick)?;
        processed += 1;
    }

    if changed {
        view.store_tick(tick);
    }
    tracing::debug!(
        processed,
        tick,
        changed,
        root = %view.root_path().display(),
        "drain cycle complete"
    );
    Ok(changed)
}

fn crawl_item(
    state: &mut ViewState,
    watcher: &dyn Watcher,
    pending: &mut PendingCollection,
    item: &PendingItem,
    tick: u32,
) -> Result<bool> {
    let rel = match state.rel_of(&item.path) {
        Ok(rel) => rel,
        Err(err) => {
            tracing::debug!(path = %item.path.display(), %err, "ignoring out-of-root pending item");
            return Ok(false);
        }
    };
    let now = epoch_secs(item.now);

    match fs::symlink_metadata(&item.path) {
        Ok(meta) if meta.is_dir() => crawl_dir(state, watcher, pending, item, &rel, now, tick),
        Ok(meta) => crawl_file(state, watcher, pending, item, &rel, &meta, now, tick),
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %item.path.display(), %err, "stat failed, treating as removed");
            }
            handle_missing(state, watcher, item, &rel, now, tick)
        }
    }
}

/// A path that no longer stats: mark the corresponding entries deleted.
fn handle_missing(
    state: &mut ViewState,
    watcher: &dyn Watcher,
    item: &PendingItem,
    rel: &str,
    now: i64,
    tick: u32,
) -> Result<bool> {
    if rel.is_empty() {
        return Err(Error::RootVanished(state.root_path().to_path_buf()));
    }

    let mut changed = false;
    if let Some(dir) = state.resolve_dir(rel) {
        if state.dirs[dir].exists {
            let recursive = item.flags.contains(PendingFlags::RECURSIVE);
            state.mark_dir_deleted(dir, now, tick, recursive);
            watcher.stop_watch_dir(&item.path);
            changed = true;
        }
    }
    if let Some(fid) = state.resolve_file(rel) {
        if state.files[fid].exists {
            state.files[fid].exists = false;
            state.mark_file_changed(fid, now, tick);
            changed = true;
        }
    }
    Ok(changed)
}

/// Reconciles a non-directory entry against its stat snapshot.
fn crawl_file(
    state: &mut ViewState,
    watcher: &dyn Watcher,
    pending: &mut PendingCollection,
    item: &PendingItem,
    rel: &str,
    meta: &fs::Metadata,
    now: i64,
    tick: u32,
) -> Result<bool> {
    let (dir_rel, name) = rel.rsplit_once('/').unwrap_or(("", rel));
    if name.is_empty() {
        return Ok(false);
    }

    // A file can surface before its parent directory has been crawled
    // (notify delivered the child first); make sure the parent gets a
    // watch and an enumeration of its own.
    if state.resolve_dir(dir_rel).is_none() {
        let parent_fs = item
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| item.path.clone());
        pending.add(&parent_fs, item.now, PendingFlags::empty());
    }
    let dir = state.resolve_dir_create(dir_rel)?;
    watcher.start_watch_file(&item.path)?;

    let fid = state.get_or_create_child_file(dir, name, now, tick);
    let new_stat = FileStat::from_metadata(meta);
    let changed = {
        let node = &state.files[fid];
        !node.exists || node.stat != new_stat
    };
    if changed {
        let node = &mut state.files[fid];
        node.exists = true;
        node.stat = new_stat;
        state.mark_file_changed(fid, now, tick);
    }
    Ok(changed)
}

/// Reconciles a directory: establish the watch, enumerate entries, feed
/// the queue, and mark children that disappeared since the last look.
fn crawl_dir(
    state: &mut ViewState,
    watcher: &dyn Watcher,
    pending: &mut PendingCollection,
    item: &PendingItem,
    rel: &str,
    now: i64,
    tick: u32,
) -> Result<bool> {
    let existed = state.resolve_dir(rel).is_some_and(|d| state.dirs[d].exists);
    let dir = state.resolve_dir_create(rel)?;
    state.dirs[dir].exists = true;
    let mut changed = !existed;

    let fs_path = state.dir_fs_path(dir);
    let handle = match watcher.start_watch_dir(&fs_path) {
        Ok(handle) => handle,
        Err(Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            // Raced with deletion between stat and open.
            return handle_missing(state, watcher, item, rel, now, tick);
        }
        Err(err) => return Err(err),
    };

    let recursive = item.flags.contains(PendingFlags::RECURSIVE);
    let mut seen_files: Vec<String> = Vec::new();
    let mut seen_dirs: Vec<String> = Vec::new();
    for entry in handle.entries() {
        if entry.kind == FileKind::Dir {
            seen_dirs.push(entry.name.as_str().to_string());
        } else {
            seen_files.push(entry.name.as_str().to_string());
        }
        let child_fs = fs_path.join(entry.name.as_str());
        if entry.kind == FileKind::Dir {
            let known = state.dirs[dir]
                .dirs
                .get(entry.name.as_str())
                .is_some_and(|&d| state.dirs[d].exists);
            // Known subdirectories carry their own watches and report
            // their own changes; descend only on recursive crawls or
            // first discovery.
            if recursive || !known {
                let flags = item.flags & PendingFlags::RECURSIVE;
                pending.add(&child_fs, item.now, flags);
            }
        } else {
            pending.add(&child_fs, item.now, PendingFlags::empty());
        }
    }

    // Anything we knew about that the enumeration no longer lists is gone.
    let missing_files: Vec<_> = state.dirs[dir]
        .files
        .iter()
        .filter(|(name, _)| !seen_files.iter().any(|s| s == name.as_str()))
        .map(|(_, &fid)| fid)
        .collect();
    for fid in missing_files {
        if state.files[fid].exists {
            state.files[fid].exists = false;
            state.mark_file_changed(fid, now, tick);
            changed = true;
        }
    }
    let missing_dirs: Vec<_> = state.dirs[dir]
        .dirs
        .iter()
        .filter(|(name, _)| !seen_dirs.iter().any(|s| s == name.as_str()))
        .map(|(_, &did)| did)
        .collect();
    for did in missing_dirs {
        if state.dirs[did].exists {
            state.mark_dir_deleted(did, now, tick, true);
            changed = true;
        }
    }

    Ok(changed)
}
