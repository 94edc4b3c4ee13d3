//! `type` and `exists` terms.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::{FileKind, FileNode};

use super::context::QueryContext;
use super::expr::{register_expression_parser, term_args, ParseCtx, QueryExpr};

#[derive(Debug)]
struct TypeExpr {
    kind: FileKind,
}

impl QueryExpr for TypeExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        file.stat.kind == self.kind
    }
}

#[derive(Debug)]
struct ExistsExpr;

impl QueryExpr for ExistsExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        file.exists
    }
}

fn parse_type(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    let args = term_args(term);
    let [arg] = args else {
        return Err(Error::Parse("'type' requires a type code".into()));
    };
    let code = arg
        .as_str()
        .filter(|s| s.chars().count() == 1)
        .ok_or_else(|| Error::Parse(format!("'type' argument must be a single character, got {arg}")))?;
    let code = code.chars().next().unwrap_or('?');
    let kind = FileKind::from_type_char(code)
        .ok_or_else(|| Error::Parse(format!("invalid type code '{code}'")))?;
    Ok(Box::new(TypeExpr { kind }))
}

fn parse_exists(_ctx: &ParseCtx, _term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(ExistsExpr))
}

pub(super) fn register() {
    register_expression_parser("type", parse_type);
    register_expression_parser("exists", parse_exists);
}
