//! Per-execution query state.

use std::collections::{HashSet, VecDeque};

use crate::cancel::CancelFlag;
use crate::view::{DirId, FileId, FileNode, ViewState};

use super::{FileInfo, Query, QuerySince, RuleMatch};

/// Holds state for the execution of one query: the result deque, the
/// wholename cache, and the dedup set.
pub struct QueryContext<'a> {
    pub(crate) query: &'a Query,
    pub(crate) state: &'a ViewState,
    pub(crate) since: QuerySince,
    pub(crate) root_number: u32,
    pub(crate) cancel: &'a CancelFlag,
    pub(crate) results: VecDeque<RuleMatch>,
    pub(crate) num_deduped: u32,
    pub(crate) num_walked: u64,
    /// Cache for dir path lookups when computing wholenames: files are
    /// processed in runs sharing a parent, so the previous parent's path
    /// is usually the next one's too.
    last_parent: Option<DirId>,
    last_parent_path: String,
    dedup: HashSet<String>,
}

impl<'a> QueryContext<'a> {
    pub(crate) fn new(
        query: &'a Query,
        state: &'a ViewState,
        since: QuerySince,
        root_number: u32,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            query,
            state,
            since,
            root_number,
            cancel,
            results: VecDeque::new(),
            num_deduped: 0,
            num_walked: 0,
            last_parent: None,
            last_parent_path: String::new(),
            dedup: HashSet::new(),
        }
    }

    pub fn state(&self) -> &'a ViewState {
        self.state
    }

    pub fn case_sensitive(&self) -> bool {
        self.query.case_sensitive
    }

    pub fn since(&self) -> QuerySince {
        self.since
    }

    fn parent_path(&mut self, parent: DirId) -> &str {
        if self.last_parent != Some(parent) {
            self.last_parent_path = self.state.dir_rel_path(parent);
            self.last_parent = Some(parent);
        }
        &self.last_parent_path
    }

    /// The file's path relative to the watch root.
    pub fn file_wholename(&mut self, file: &FileNode) -> String {
        let parent = self.parent_path(file.parent);
        if parent.is_empty() {
            file.name.as_str().to_string()
        } else {
            format!("{parent}/{}", file.name)
        }
    }

    /// Runs one candidate file through the query engine: relative-root
    /// containment, expression evaluation, dedup, and emission.
    pub(crate) fn process_file(&mut self, fid: FileId) {
        let state = self.state;
        let query = self.query;
        let file = &state.files[fid];
        self.num_walked += 1;

        let wholename = self.file_wholename(file);
        let relname = match &query.relative_root {
            Some(rr) => {
                let under = wholename.len() > rr.len() + 1
                    && wholename.starts_with(rr.as_str())
                    && wholename.as_bytes()[rr.len()] == b'/';
                if !under {
                    return;
                }
                wholename[rr.len() + 1..].to_string()
            }
            None => wholename,
        };

        if let Some(expr) = &query.expr {
            if !expr.evaluate(self, file) {
                return;
            }
        }

        if query.dedup_results {
            if self.dedup.contains(&relname) {
                self.num_deduped += 1;
                return;
            }
            self.dedup.insert(relname.clone());
        }

        let is_new = match self.since {
            QuerySince::Timestamp(ts) => file.ctime.timestamp >= ts,
            QuerySince::Clock { fresh: true, .. } => true,
            QuerySince::Clock { fresh: false, ticks } => file.ctime.ticks > ticks,
        };

        self.results.push_back(RuleMatch {
            root_number: self.root_number,
            relname,
            is_new,
            file: FileInfo::capture(file),
        });
    }
}
