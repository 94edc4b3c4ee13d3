//! Query engine: parsed query structure, compiled expression trees,
//! generators, and execution against the in-memory view.
//!
//! A query is evaluated in three stages: a *generator* enumerates candidate
//! files (by recency, suffix, path, glob, or exhaustively), each candidate
//! runs through relative-root filtering and the compiled expression tree,
//! and surviving matches land in the result deque together with a cursor
//! for the next query.

mod boolean;
mod context;
mod execute;
mod expr;
mod generator;
mod glob;
mod intcompare;
mod kind;
mod name;
mod parse;
mod suffix;
mod wild;

use std::collections::VecDeque;
use std::time::Duration;

pub use context::QueryContext;
pub use execute::execute;
pub use expr::{expr_parse, init_all, register_expression_parser, ParseCtx, QueryExpr, TermParser};
pub use glob::{GlobFlags, GlobTree};
pub use intcompare::{IcmpOp, IntCompare};
pub use parse::parse_query;

use crate::strings::StringRef;
use crate::view::{ClockStamp, FileNode, FileStat};

/// Sentinel for unlimited traversal depth in a path specification.
pub const DEPTH_UNLIMITED: u32 = u32::MAX;

/// One path specification: a name relative to the effective root and how
/// deep to descend beneath it (0 = immediate contents only).
#[derive(Debug, Clone)]
pub struct QueryPath {
    pub name: String,
    pub depth: u32,
}

/// Client-supplied point in logical time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockSpec {
    /// Wall-clock seconds since the epoch.
    Timestamp(i64),
    /// `(root_number, ticks)` pair; a missing root number means the
    /// current watch session.
    Clock {
        root_number: Option<u32>,
        ticks: u32,
    },
    /// Named cursor, resolved at execution time.
    Named(String),
}

/// The since cursor as resolved at execution time.
#[derive(Debug, Clone, Copy)]
pub enum QuerySince {
    Timestamp(i64),
    Clock { fresh: bool, ticks: u32 },
}

impl QuerySince {
    pub fn is_fresh_instance(&self) -> bool {
        matches!(self, Self::Clock { fresh: true, .. })
    }
}

/// Output field selector consumed by the (external) result renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    Name,
    Exists,
    New,
    Size,
    Mode,
    Mtime,
    Ctime,
    OClock,
    CClock,
    Type,
}

impl QueryField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "exists" => Some(Self::Exists),
            "new" => Some(Self::New),
            "size" => Some(Self::Size),
            "mode" => Some(Self::Mode),
            "mtime" => Some(Self::Mtime),
            "ctime" => Some(Self::Ctime),
            "oclock" => Some(Self::OClock),
            "cclock" => Some(Self::CClock),
            "type" => Some(Self::Type),
            _ => None,
        }
    }
}

pub type FieldList = Vec<QueryField>;

pub(crate) fn default_field_list() -> FieldList {
    vec![
        QueryField::Name,
        QueryField::Exists,
        QueryField::New,
        QueryField::Size,
        QueryField::Mode,
    ]
}

/// A parsed, validated query description.
#[derive(Debug)]
pub struct Query {
    pub case_sensitive: bool,
    pub empty_on_fresh_instance: bool,
    pub dedup_results: bool,
    /// Matches restricted to this subtree, relative to the watch root.
    pub relative_root: Option<String>,
    pub paths: Vec<QueryPath>,
    /// Lowercase suffixes.
    pub suffixes: Vec<StringRef>,
    pub glob_tree: Option<GlobTree>,
    pub since_spec: Option<ClockSpec>,
    pub expr: Option<Box<dyn QueryExpr>>,
    pub fields: FieldList,
    pub sync_timeout: Duration,
    pub lock_timeout: Duration,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            empty_on_fresh_instance: false,
            dedup_results: false,
            relative_root: None,
            paths: Vec::new(),
            suffixes: Vec::new(),
            glob_tree: None,
            since_spec: None,
            expr: None,
            fields: default_field_list(),
            sync_timeout: Duration::ZERO,
            lock_timeout: Duration::from_secs(1),
        }
    }
}

/// Owned snapshot of a file's attributes, safe to use after the read lock
/// is released.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileInfo {
    pub name: StringRef,
    pub exists: bool,
    pub stat: FileStat,
    /// Most recent observation clock.
    pub oclock: ClockStamp,
    /// Creation clock.
    pub cclock: ClockStamp,
}

impl FileInfo {
    pub(crate) fn capture(file: &FileNode) -> Self {
        Self {
            name: file.name.clone(),
            exists: file.exists,
            stat: file.stat,
            oclock: file.otime,
            cclock: file.ctime,
        }
    }
}

/// One matched file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleMatch {
    pub root_number: u32,
    /// Path relative to the query's effective root.
    pub relname: String,
    /// Whether the file was first observed after the since cursor.
    pub is_new: bool,
    pub file: FileInfo,
}

/// The outcome of one query execution.
#[derive(Debug, serde::Serialize)]
pub struct QueryResult {
    pub is_fresh_instance: bool,
    pub results: VecDeque<RuleMatch>,
    pub root_number: u32,
    /// Tick counter at query start; feed back as the next since cursor.
    pub ticks: u32,
    /// How many results were suppressed by dedup checking.
    pub num_deduped: u32,
}
