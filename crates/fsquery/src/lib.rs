//! Filesystem-watching query service core.
//!
//! This crate mirrors the structure of watched filesystem subtrees in
//! memory, consumes change notifications from the operating system, and
//! answers structured queries about what has changed since a caller-supplied
//! point in logical time.
//!
//! ## Architecture
//!
//! Each watched root gets its own **I/O thread** running the
//! watcher→crawler loop: the watcher backend turns kernel events into a
//! coalescing pending collection, and the crawler drains it against the
//! in-memory view under the write lock, advancing a monotonic tick counter
//! once per cycle that observed change. Queries execute on caller threads
//! under the read lock and carry a *since* cursor binding the two halves.
//!
//! ## Module Structure
//!
//! - `view` - Tree store: directories, files, recency list, suffix index
//! - `watcher` - Platform event sources behind the `Watcher` trait
//! - `query` - Query parsing, expression trees, generators, execution
//! - `pending` - Coalescing work queue between watcher and crawler
//! - `root` - Per-root service wiring it all together

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
pub mod pending;
pub mod query;
pub mod root;
pub mod strings;
pub mod view;
pub mod watcher;

// Re-export main types
pub use cancel::CancelFlag;
pub use config::Config;
pub use error::{Error, Result};
pub use query::{
    execute, init_all, parse_query, ClockSpec, Query, QueryExpr, QueryResult, RuleMatch,
};
pub use root::WatchedRoot;
pub use strings::StringRef;
pub use view::{FileKind, InMemoryView};
pub use watcher::{NotifyWatcher, StubWatcher, Watcher};
