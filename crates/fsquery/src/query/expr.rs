//! Expression tree nodes and the process-wide term parser registry.
//!
//! Expression nodes are trait objects: each implements [`QueryExpr`] and
//! decides per-file inclusion, short-circuiting where it can. The set of
//! term kinds is extensible through [`register_expression_parser`]; the
//! registry is populated once by [`init_all`] and is append-only, so names
//! never change meaning after registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Once, RwLock};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::FileNode;

use super::context::QueryContext;

/// A compiled expression node.
pub trait QueryExpr: fmt::Debug + Send + Sync {
    fn evaluate(&self, ctx: &mut QueryContext<'_>, file: &FileNode) -> bool;
}

/// Context available to term parsers.
#[derive(Debug, Clone, Copy)]
pub struct ParseCtx {
    pub case_sensitive: bool,
}

/// A parser capability: consumes a JSON-shaped term, returns a node.
pub type TermParser = fn(&ParseCtx, &Value) -> Result<Box<dyn QueryExpr>>;

static REGISTRY: LazyLock<RwLock<HashMap<String, TermParser>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static INIT: Once = Once::new();

/// Registers a term parser under `name`. Returns false if the name is
/// already taken.
pub fn register_expression_parser(name: &str, parser: TermParser) -> bool {
    let mut registry = match REGISTRY.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if registry.contains_key(name) {
        return false;
    }
    registry.insert(name.to_string(), parser);
    true
}

/// Registers all built-in term parsers. Idempotent; the registry is
/// effectively read-only once this returns.
pub fn init_all() {
    INIT.call_once(|| {
        super::boolean::register();
        super::name::register();
        super::suffix::register();
        super::kind::register();
        super::intcompare::register();
        super::wild::register();
    });
}

/// Parses one term: either a bare string (`"exists"`) or an array whose
/// first element names the term (`["size", "ge", 1024]`).
pub fn expr_parse(ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    let name = match term {
        Value::String(name) => name.as_str(),
        Value::Array(parts) => parts
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("expected term name as first array element".into()))?,
        other => {
            return Err(Error::Parse(format!(
                "expected term to be a string or array, got {other}"
            )))
        }
    };

    let parser = {
        let registry = match REGISTRY.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.get(name).copied()
    };
    match parser {
        Some(parser) => parser(ctx, term),
        None => Err(Error::Parse(format!("unknown expression term '{name}'"))),
    }
}

/// Splits a term into its arguments, past the leading name.
pub(crate) fn term_args(term: &Value) -> &[Value] {
    match term {
        Value::Array(parts) => parts.get(1..).unwrap_or(&[]),
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        init_all();
        fn dummy(_: &ParseCtx, _: &Value) -> Result<Box<dyn QueryExpr>> {
            unreachable!()
        }
        assert!(!register_expression_parser("true", dummy));
        assert!(register_expression_parser("test-only-term", dummy));
        assert!(!register_expression_parser("test-only-term", dummy));
    }

    #[test]
    fn unknown_terms_fail_parse() {
        init_all();
        let ctx = ParseCtx {
            case_sensitive: true,
        };
        let err = expr_parse(&ctx, &serde_json::json!(["no-such-term"])).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn malformed_terms_fail_parse() {
        init_all();
        let ctx = ParseCtx {
            case_sensitive: true,
        };
        assert!(expr_parse(&ctx, &serde_json::json!(42)).is_err());
        assert!(expr_parse(&ctx, &serde_json::json!([42, "x"])).is_err());
    }
}
