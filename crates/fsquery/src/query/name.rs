//! `name` / `iname` terms: exact name matching against the basename or
//! wholename, single value or set.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::FileNode;

use super::context::QueryContext;
use super::expr::{register_expression_parser, term_args, ParseCtx, QueryExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum NameScope {
    Basename,
    Wholename,
}

pub(super) fn parse_scope(value: &Value) -> Result<NameScope> {
    match value.as_str() {
        Some("basename") => Ok(NameScope::Basename),
        Some("wholename") => Ok(NameScope::Wholename),
        _ => Err(Error::Parse(format!(
            "invalid scope '{value}', expected 'basename' or 'wholename'"
        ))),
    }
}

#[derive(Debug)]
struct NameExpr {
    names: HashSet<String>,
    scope: NameScope,
    case_sensitive: bool,
}

impl QueryExpr for NameExpr {
    fn evaluate(&self, ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        let candidate = match self.scope {
            NameScope::Basename => file.name.as_str().to_string(),
            NameScope::Wholename => ctx.file_wholename(file),
        };
        if self.case_sensitive {
            self.names.contains(&candidate)
        } else {
            self.names.contains(&candidate.to_ascii_lowercase())
        }
    }
}

fn parse_name_term(term: &Value, case_sensitive: bool) -> Result<Box<dyn QueryExpr>> {
    let args = term_args(term);
    let (names_arg, rest) = args
        .split_first()
        .ok_or_else(|| Error::Parse("'name' requires a name or list of names".into()))?;

    let mut names = HashSet::new();
    match names_arg {
        Value::String(name) => {
            names.insert(name.clone());
        }
        Value::Array(list) => {
            for entry in list {
                let name = entry.as_str().ok_or_else(|| {
                    Error::Parse("'name' list entries must be strings".into())
                })?;
                names.insert(name.to_string());
            }
        }
        other => {
            return Err(Error::Parse(format!(
                "'name' argument must be a string or array, got {other}"
            )))
        }
    }
    if !case_sensitive {
        names = names.into_iter().map(|n| n.to_ascii_lowercase()).collect();
    }

    let scope = match rest {
        [] => NameScope::Basename,
        [scope] => parse_scope(scope)?,
        _ => return Err(Error::Parse("too many arguments to 'name'".into())),
    };

    Ok(Box::new(NameExpr {
        names,
        scope,
        case_sensitive,
    }))
}

fn parse_name(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    parse_name_term(term, true)
}

fn parse_iname(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    parse_name_term(term, false)
}

pub(super) fn register() {
    register_expression_parser("name", parse_name);
    register_expression_parser("iname", parse_iname);
}
