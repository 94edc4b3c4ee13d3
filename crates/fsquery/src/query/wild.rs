//! `match` / `imatch` terms: wildmatch against the basename or wholename.

use glob::{MatchOptions, Pattern};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::FileNode;

use super::context::QueryContext;
use super::expr::{register_expression_parser, term_args, ParseCtx, QueryExpr};
use super::name::{parse_scope, NameScope};

#[derive(Debug)]
struct MatchExpr {
    pattern: Pattern,
    scope: NameScope,
    options: MatchOptions,
}

impl QueryExpr for MatchExpr {
    fn evaluate(&self, ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        match self.scope {
            NameScope::Basename => self
                .pattern
                .matches_with(file.name.as_str(), self.options),
            NameScope::Wholename => self
                .pattern
                .matches_with(&ctx.file_wholename(file), self.options),
        }
    }
}

fn parse_match_term(term: &Value, case_sensitive: bool) -> Result<Box<dyn QueryExpr>> {
    let args = term_args(term);
    let (pattern_arg, rest) = args
        .split_first()
        .ok_or_else(|| Error::Parse("'match' requires a pattern".into()))?;
    let raw = pattern_arg
        .as_str()
        .ok_or_else(|| Error::Parse(format!("'match' pattern must be a string, got {pattern_arg}")))?;
    let pattern = Pattern::new(raw)
        .map_err(|err| Error::Parse(format!("failed to compile pattern '{raw}': {err}")))?;

    let scope = match rest {
        [] => NameScope::Basename,
        [scope] => parse_scope(scope)?,
        _ => return Err(Error::Parse("too many arguments to 'match'".into())),
    };

    let options = MatchOptions {
        case_sensitive,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    Ok(Box::new(MatchExpr {
        pattern,
        scope,
        options,
    }))
}

fn parse_match(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    parse_match_term(term, true)
}

fn parse_imatch(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    parse_match_term(term, false)
}

pub(super) fn register() {
    register_expression_parser("match", parse_match);
    register_expression_parser("imatch", parse_imatch);
}
