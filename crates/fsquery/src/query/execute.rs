//! Query execution: since resolution, fresh-instance detection, lock
//! acquisition, generator dispatch, and cursor bookkeeping.

use std::collections::VecDeque;

use crate::cancel::CancelFlag;
use crate::error::Result;
use crate::view::{InMemoryView, ViewState};

use super::context::QueryContext;
use super::{generator, ClockSpec, Query, QueryResult, QuerySince};

/// Resolves the query's since specification against the current watch
/// session. The execution is *fresh-instance* when the cursor refers to an
/// older root incarnation, an unknown named cursor, or a tick that predates
/// the last age-out.
fn resolve_since(
    view: &InMemoryView,
    state: &ViewState,
    query: &Query,
    current_root_number: u32,
) -> QuerySince {
    match &query.since_spec {
        None => QuerySince::Clock {
            fresh: false,
            ticks: 0,
        },
        Some(ClockSpec::Timestamp(ts)) => QuerySince::Timestamp(*ts),
        Some(ClockSpec::Clock { root_number, ticks }) => {
            let same_root = root_number.map_or(true, |rn| rn == current_root_number);
            QuerySince::Clock {
                fresh: !same_root || *ticks < state.last_age_out_tick(),
                ticks: *ticks,
            }
        }
        Some(ClockSpec::Named(name)) => match view.cursor_get(name) {
            Some(ticks) => QuerySince::Clock {
                fresh: ticks < state.last_age_out_tick(),
                ticks,
            },
            None => QuerySince::Clock {
                fresh: true,
                ticks: 0,
            },
        },
    }
}

/// Evaluates `query` against the view under a read lock.
///
/// Execution errors discard partial results; the caller sees only the
/// error. A successful run with a named since cursor advances that cursor
/// to the query-start tick.
pub fn execute(view: &InMemoryView, query: &Query, cancel: &CancelFlag) -> Result<QueryResult> {
    cancel.check()?;
    let state = view.read_for(query.lock_timeout)?;
    let root_number = view.root_number();
    let ticks = view.most_recent_tick();

    let since = resolve_since(view, &state, query, root_number);
    let is_fresh_instance = since.is_fresh_instance();

    let result = if is_fresh_instance && query.empty_on_fresh_instance {
        QueryResult {
            is_fresh_instance: true,
            results: VecDeque::new(),
            root_number,
            ticks,
            num_deduped: 0,
        }
    } else {
        let mut ctx = QueryContext::new(query, &state, since, root_number, cancel);
        generator::run(&mut ctx)?;
        QueryResult {
            is_fresh_instance,
            results: ctx.results,
            root_number,
            ticks,
            num_deduped: ctx.num_deduped,
        }
    };
    drop(state);

    if let Some(ClockSpec::Named(name)) = &query.since_spec {
        view.cursor_set(name, ticks);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pending::{PendingCollection, PendingFlags};
    use crate::query::parse_query;
    use crate::view::crawl::process_pending;
    use crate::watcher::StubWatcher;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn crawl_paths(view: &InMemoryView, paths: &[(&Path, PendingFlags)]) {
        let mut pending = PendingCollection::new();
        for (path, flags) in paths {
            pending.add(path, SystemTime::now(), *flags);
        }
        process_pending(view, &StubWatcher::new(), &mut pending, &CancelFlag::new()).unwrap();
    }

    fn initial_crawl(view: &InMemoryView) {
        crawl_paths(
            view,
            &[(view.root_path(), PendingFlags::RECURSIVE)],
        );
    }

    fn run(view: &InMemoryView, spec: serde_json::Value) -> QueryResult {
        let query = parse_query(&spec).unwrap();
        execute(view, &query, &CancelFlag::new()).unwrap()
    }

    fn relnames(result: &QueryResult) -> Vec<String> {
        let mut names: Vec<String> = result.results.iter().map(|m| m.relname.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn create_then_modify() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, b"first").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let result = run(&view, json!({"since": {"clock": 0}, "suffix": ["txt"]}));
        assert_eq!(result.ticks, 1);
        assert!(!result.is_fresh_instance);
        assert_eq!(result.results.len(), 1);
        let m = &result.results[0];
        assert_eq!(m.relname, "a.txt");
        assert_eq!(m.file.name, "a.txt");
        assert!(m.is_new);

        std::fs::write(&file, b"modified contents").unwrap();
        crawl_paths(&view, &[(&file, PendingFlags::VIA_NOTIFY)]);

        let result = run(&view, json!({"since": {"clock": 1}, "suffix": ["txt"]}));
        assert_eq!(result.results.len(), 1);
        assert!(!result.results[0].is_new);
    }

    #[test]
    fn delete_then_age_out() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("b.log");
        std::fs::write(&file, b"data").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);
        std::fs::remove_file(&file).unwrap();
        crawl_paths(&view, &[(&file, PendingFlags::VIA_NOTIFY)]);

        let result = run(&view, json!({"since": {"clock": 0}}));
        assert_eq!(result.results.len(), 1);
        assert!(result.results[0].is_new);
        assert!(!result.results[0].file.exists);

        view.age_out(Duration::from_secs(0));
        let result = run(&view, json!({"since": {"clock": 0}}));
        assert_eq!(result.results.len(), 0);
    }

    #[test]
    fn glob_with_doublestar() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("x/y")).unwrap();
        std::fs::write(tmp.path().join("x/y/z.cpp"), b"z").unwrap();
        std::fs::write(tmp.path().join("x/w.cpp"), b"w").unwrap();
        std::fs::write(tmp.path().join("t.txt"), b"t").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let result = run(&view, json!({"glob": ["**/*.cpp"]}));
        assert_eq!(relnames(&result), vec!["x/w.cpp", "x/y/z.cpp"]);
    }

    #[test]
    fn glob_literal_components_hash_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/lib.rs"), b"l").unwrap();
        std::fs::write(tmp.path().join("src/main.rs"), b"m").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let result = run(&view, json!({"glob": ["src/lib.rs", "src/*.rs"]}));
        // lib.rs matches both patterns; without dedup it appears twice.
        assert_eq!(result.results.len(), 3);

        let result = run(
            &view,
            json!({"glob": ["src/lib.rs", "src/*.rs"], "dedup_results": true}),
        );
        assert_eq!(relnames(&result), vec!["src/lib.rs", "src/main.rs"]);
        assert_eq!(result.num_deduped, 1);
    }

    #[test]
    fn dedup_across_generators() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("x/y")).unwrap();
        std::fs::write(tmp.path().join("x/y/z"), b"z").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let result = run(
            &view,
            json!({
                "path": [{"path": "x", "depth": -1}, {"path": "x/y", "depth": -1}],
                "dedup_results": true,
            }),
        );
        assert_eq!(relnames(&result), vec!["x/y/z"]);
        assert_eq!(result.num_deduped, 1);
    }

    #[test]
    fn dedup_is_idempotent_across_runs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("x/y")).unwrap();
        std::fs::write(tmp.path().join("x/y/z"), b"z").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let spec = json!({
            "path": [{"path": "x", "depth": -1}, {"path": "x/y", "depth": -1}],
            "dedup_results": true,
        });
        let first = run(&view, spec.clone());
        let second = run(&view, spec);
        assert_eq!(relnames(&first), relnames(&second));
        assert_eq!(first.num_deduped, second.num_deduped);
    }

    #[test]
    fn fresh_instance_suppression() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let stale_root = view.root_number() + 100;
        let result = run(
            &view,
            json!({
                "since": {"clock": 1, "root": stale_root},
                "empty_on_fresh_instance": true,
            }),
        );
        assert!(result.is_fresh_instance);
        assert!(result.results.is_empty());
    }

    #[test]
    fn fresh_instance_emission_equals_all_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("d")).unwrap();
        std::fs::write(tmp.path().join("d/a.rs"), b"a").unwrap();
        std::fs::write(tmp.path().join("b.rs"), b"b").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let stale_root = view.root_number() + 1;
        let fresh = run(&view, json!({"since": {"clock": 3, "root": stale_root}}));
        let all = run(&view, json!({}));

        assert!(fresh.is_fresh_instance);
        assert!(!all.is_fresh_instance);
        assert_eq!(relnames(&fresh), relnames(&all));
        assert!(fresh.results.iter().all(|m| m.is_new));
    }

    #[test]
    fn since_monotonicity() {
        let tmp = tempfile::tempdir().unwrap();
        let view = InMemoryView::new(tmp.path());
        std::fs::write(tmp.path().join("one.c"), b"1").unwrap();
        initial_crawl(&view);
        std::fs::write(tmp.path().join("two.c"), b"2").unwrap();
        crawl_paths(
            &view,
            &[(&tmp.path().join("two.c"), PendingFlags::VIA_NOTIFY)],
        );

        let at0 = run(&view, json!({"since": {"clock": 0}}));
        let at1 = run(&view, json!({"since": {"clock": 1}}));
        assert_eq!(relnames(&at0), vec!["one.c", "two.c"]);
        assert_eq!(relnames(&at1), vec!["two.c"]);
        for name in relnames(&at1) {
            assert!(relnames(&at0).contains(&name));
        }
    }

    #[test]
    fn lock_timeout_fails_query() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();

        let view = Arc::new(InMemoryView::new(tmp.path()));
        initial_crawl(&view);

        let guard = view.write();
        let contender = view.clone();
        let handle = std::thread::spawn(move || {
            let query = parse_query(&json!({"lock_timeout": 10})).unwrap();
            execute(&contender, &query, &CancelFlag::new())
        });
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
        drop(guard);
    }

    #[test]
    fn expressions_filter_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("small.rs"), b"x").unwrap();
        std::fs::write(tmp.path().join("large.rs"), vec![b'x'; 4096]).unwrap();
        std::fs::write(tmp.path().join("large.txt"), vec![b'y'; 4096]).unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let result = run(
            &view,
            json!({"expression": ["allof", ["suffix", "rs"], ["size", "ge", 1024]]}),
        );
        assert_eq!(relnames(&result), vec!["large.rs"]);

        let result = run(
            &view,
            json!({"expression": ["anyof", ["name", "small.rs"], ["name", "large.txt"]]}),
        );
        assert_eq!(relnames(&result), vec!["large.txt", "small.rs"]);

        let result = run(&view, json!({"expression": ["not", "exists"]}));
        assert!(result.results.is_empty());
    }

    #[test]
    fn relative_root_restricts_and_rebases_matches() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub/inner")).unwrap();
        std::fs::write(tmp.path().join("sub/inner/a.go"), b"a").unwrap();
        std::fs::write(tmp.path().join("outside.go"), b"o").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        let result = run(&view, json!({"relative_root": "sub", "suffix": "go"}));
        assert_eq!(relnames(&result), vec!["inner/a.go"]);
    }

    #[test]
    fn named_cursor_advances_on_success() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();

        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        // Unknown cursor: fresh instance, emits everything.
        let first = run(&view, json!({"since": "n:sub"}));
        assert!(first.is_fresh_instance);
        assert_eq!(first.results.len(), 1);
        assert_eq!(view.cursor_get("sub"), Some(1));

        // No changes since: the advanced cursor yields nothing new.
        let second = run(&view, json!({"since": "n:sub"}));
        assert!(!second.is_fresh_instance);
        assert!(second.results.is_empty());

        std::fs::write(tmp.path().join("b.txt"), b"b").unwrap();
        crawl_paths(
            &view,
            &[(&tmp.path().join("b.txt"), PendingFlags::VIA_NOTIFY)],
        );
        let third = run(&view, json!({"since": "n:sub"}));
        assert_eq!(relnames(&third), vec!["b.txt"]);
    }

    #[test]
    fn cancelled_query_returns_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let view = InMemoryView::new(tmp.path());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let query = parse_query(&json!({})).unwrap();
        let err = execute(&view, &query, &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn time_generator_stops_at_since_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.c"), b"old").unwrap();
        let view = InMemoryView::new(tmp.path());
        initial_crawl(&view);

        std::fs::write(tmp.path().join("new.c"), b"new").unwrap();
        crawl_paths(
            &view,
            &[(&tmp.path().join("new.c"), PendingFlags::VIA_NOTIFY)],
        );

        let result = run(&view, json!({"since": {"clock": 1}}));
        assert_eq!(relnames(&result), vec!["new.c"]);
        assert!(result.results[0].is_new);
        assert_eq!(result.ticks, 2);
    }
}
