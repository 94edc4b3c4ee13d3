//! Generators: strategies for enumerating candidate files.
//!
//! Exactly one generator runs per execution; the first applicable rule
//! wins: paths, then suffixes, then globs, then the recency walk for
//! since-queries, and an exhaustive traversal otherwise.

use crate::error::Result;
use crate::view::{DirId, FileId, ViewState};

use super::context::QueryContext;
use super::glob::{GlobNode, GlobToken, GlobTree};
use super::{QuerySince, DEPTH_UNLIMITED};

pub(crate) fn run(ctx: &mut QueryContext<'_>) -> Result<()> {
    let query = ctx.query;
    if !query.paths.is_empty() {
        return path_generator(ctx);
    }
    if !query.suffixes.is_empty() {
        return suffix_generator(ctx);
    }
    if let Some(tree) = &query.glob_tree {
        if !tree.is_empty() {
            return glob_generator(ctx, tree);
        }
    }
    if query.since_spec.is_some() && !ctx.since.is_fresh_instance() {
        return time_generator(ctx);
    }
    all_files_generator(ctx)
}

/// Walks the recency list from most to least recently observed, stopping
/// at the first file older than the since cursor. No directory traversal.
fn time_generator(ctx: &mut QueryContext<'_>) -> Result<()> {
    let state = ctx.state;
    let mut cursor = state.latest_file();
    while let Some(fid) = cursor {
        ctx.cancel.check_sparse(ctx.num_walked as usize)?;
        let file = &state.files[fid];
        match ctx.since {
            QuerySince::Timestamp(ts) if file.otime.timestamp < ts => break,
            QuerySince::Clock { ticks, .. } if file.otime.ticks <= ticks => break,
            _ => {}
        }
        ctx.process_file(fid);
        cursor = file.recency_next.to_option();
    }
    Ok(())
}

/// Walks the per-suffix list for each configured suffix.
fn suffix_generator(ctx: &mut QueryContext<'_>) -> Result<()> {
    let state = ctx.state;
    let query = ctx.query;
    for suffix in &query.suffixes {
        let mut cursor = state.suffix_head(suffix.as_str());
        while let Some(fid) = cursor {
            ctx.cancel.check_sparse(ctx.num_walked as usize)?;
            ctx.process_file(fid);
            cursor = state.files[fid].suffix_next.to_option();
        }
    }
    Ok(())
}

/// Resolves each path specification and visits it up to its depth.
fn path_generator(ctx: &mut QueryContext<'_>) -> Result<()> {
    let state = ctx.state;
    let query = ctx.query;
    for qp in &query.paths {
        ctx.cancel.check()?;
        let full = match &query.relative_root {
            Some(rr) if qp.name.is_empty() => rr.clone(),
            Some(rr) => format!("{rr}/{}", qp.name),
            None => qp.name.clone(),
        };
        if let Some(fid) = state.resolve_file(&full) {
            ctx.process_file(fid);
        }
        let Some(dir) = state.resolve_dir(&full) else {
            continue;
        };
        dir_generator(ctx, dir, qp.depth)?;
    }
    Ok(())
}

/// Recursive pre-order traversal of the effective root.
fn all_files_generator(ctx: &mut QueryContext<'_>) -> Result<()> {
    dir_generator(ctx, ctx.state.root(), DEPTH_UNLIMITED)
}

fn dir_generator(ctx: &mut QueryContext<'_>, dir: DirId, depth: u32) -> Result<()> {
    let state = ctx.state;
    for &fid in state.dirs[dir].files.values() {
        ctx.cancel.check_sparse(ctx.num_walked as usize)?;
        ctx.process_file(fid);
    }
    if depth > 0 {
        let next = if depth == DEPTH_UNLIMITED {
            DEPTH_UNLIMITED
        } else {
            depth - 1
        };
        for &child in state.dirs[dir].dirs.values() {
            dir_generator(ctx, child, next)?;
        }
    }
    Ok(())
}

/// Walks the glob tree in parallel with the directory tree.
fn glob_generator(ctx: &mut QueryContext<'_>, tree: &GlobTree) -> Result<()> {
    let state = ctx.state;
    let start = match &ctx.query.relative_root {
        Some(rr) => match state.resolve_dir(rr) {
            Some(dir) => dir,
            None => return Ok(()),
        },
        None => state.root(),
    };
    glob_tree_step(ctx, tree, &tree.roots, start)
}

fn glob_tree_step(
    ctx: &mut QueryContext<'_>,
    tree: &GlobTree,
    nodes: &[GlobNode],
    dir: DirId,
) -> Result<()> {
    let state = ctx.state;
    for node in nodes {
        ctx.cancel.check_sparse(ctx.num_walked as usize)?;
        match &node.token {
            GlobToken::Literal(name) => {
                if node.is_leaf {
                    if let Some(fid) = lookup_file(state, dir, name, tree.case_sensitive) {
                        ctx.process_file(fid);
                    }
                }
                if !node.children.is_empty() {
                    if let Some(child) = lookup_dir(state, dir, name, tree.case_sensitive) {
                        glob_tree_step(ctx, tree, &node.children, child)?;
                    }
                }
            }
            GlobToken::Pattern(pattern) => {
                if node.is_leaf {
                    for (fname, &fid) in &state.dirs[dir].files {
                        if pattern.matches_with(fname.as_str(), tree.options) {
                            ctx.process_file(fid);
                        }
                    }
                }
                if !node.children.is_empty() {
                    for (dname, &child) in &state.dirs[dir].dirs {
                        if pattern.matches_with(dname.as_str(), tree.options) {
                            glob_tree_step(ctx, tree, &node.children, child)?;
                        }
                    }
                }
            }
            GlobToken::DoubleStar => glob_doublestar(ctx, tree, node, dir)?,
        }
    }
    Ok(())
}

/// A `**` fragment forks: one branch applies the remainder at this
/// directory, the other consumes one path component and stays on the
/// doublestar node.
fn glob_doublestar(
    ctx: &mut QueryContext<'_>,
    tree: &GlobTree,
    node: &GlobNode,
    dir: DirId,
) -> Result<()> {
    let state = ctx.state;
    glob_tree_step(ctx, tree, &node.children, dir)?;
    if node.is_leaf {
        for &fid in state.dirs[dir].files.values() {
            ctx.process_file(fid);
        }
    }
    for &child in state.dirs[dir].dirs.values() {
        ctx.cancel.check_sparse(ctx.num_walked as usize)?;
        glob_doublestar(ctx, tree, node, child)?;
    }
    Ok(())
}

fn lookup_file(state: &ViewState, dir: DirId, name: &str, case_sensitive: bool) -> Option<FileId> {
    let files = &state.dirs[dir].files;
    if case_sensitive {
        return files.get(name).copied();
    }
    files
        .iter()
        .find(|(candidate, _)| candidate.as_str().eq_ignore_ascii_case(name))
        .map(|(_, &fid)| fid)
}

fn lookup_dir(state: &ViewState, dir: DirId, name: &str, case_sensitive: bool) -> Option<DirId> {
    let dirs = &state.dirs[dir].dirs;
    if case_sensitive {
        return dirs.get(name).copied();
    }
    dirs.iter()
        .find(|(candidate, _)| candidate.as_str().eq_ignore_ascii_case(name))
        .map(|(_, &did)| did)
}
