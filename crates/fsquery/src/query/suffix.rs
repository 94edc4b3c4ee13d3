//! `suffix` term: case-insensitive file suffix matching.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::FileNode;

use super::context::QueryContext;
use super::expr::{register_expression_parser, term_args, ParseCtx, QueryExpr};

#[derive(Debug)]
struct SuffixExpr {
    suffixes: HashSet<String>,
}

impl QueryExpr for SuffixExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        match file.suffix() {
            Some(suffix) => self.suffixes.contains(suffix.as_str()),
            None => false,
        }
    }
}

fn parse_suffix(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    let args = term_args(term);
    let [arg] = args else {
        return Err(Error::Parse(
            "'suffix' requires a suffix or list of suffixes".into(),
        ));
    };

    let mut suffixes = HashSet::new();
    match arg {
        Value::String(suffix) => {
            suffixes.insert(suffix.to_ascii_lowercase());
        }
        Value::Array(list) => {
            for entry in list {
                let suffix = entry.as_str().ok_or_else(|| {
                    Error::Parse("'suffix' list entries must be strings".into())
                })?;
                suffixes.insert(suffix.to_ascii_lowercase());
            }
        }
        other => {
            return Err(Error::Parse(format!(
                "'suffix' argument must be a string or array, got {other}"
            )))
        }
    }

    Ok(Box::new(SuffixExpr { suffixes }))
}

pub(super) fn register() {
    register_expression_parser("suffix", parse_suffix);
}
