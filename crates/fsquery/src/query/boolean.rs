//! Boolean combinator terms: `true`, `false`, `allof`, `anyof`, `not`.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::FileNode;

use super::context::QueryContext;
use super::expr::{expr_parse, register_expression_parser, term_args, ParseCtx, QueryExpr};

#[derive(Debug)]
struct TrueExpr;

impl QueryExpr for TrueExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, _file: &FileNode) -> bool {
        true
    }
}

#[derive(Debug)]
struct FalseExpr;

impl QueryExpr for FalseExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, _file: &FileNode) -> bool {
        false
    }
}

#[derive(Debug)]
struct NotExpr(Box<dyn QueryExpr>);

impl QueryExpr for NotExpr {
    fn evaluate(&self, ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        !self.0.evaluate(ctx, file)
    }
}

#[derive(Debug)]
struct AllOfExpr(Vec<Box<dyn QueryExpr>>);

impl QueryExpr for AllOfExpr {
    fn evaluate(&self, ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        self.0.iter().all(|sub| sub.evaluate(ctx, file))
    }
}

#[derive(Debug)]
struct AnyOfExpr(Vec<Box<dyn QueryExpr>>);

impl QueryExpr for AnyOfExpr {
    fn evaluate(&self, ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        self.0.iter().any(|sub| sub.evaluate(ctx, file))
    }
}

fn parse_true(_ctx: &ParseCtx, _term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(TrueExpr))
}

fn parse_false(_ctx: &ParseCtx, _term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(FalseExpr))
}

fn parse_not(ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    let args = term_args(term);
    let [sub] = args else {
        return Err(Error::Parse(
            "'not' must have exactly one subexpression".into(),
        ));
    };
    Ok(Box::new(NotExpr(expr_parse(ctx, sub)?)))
}

fn parse_subexpressions(ctx: &ParseCtx, name: &str, term: &Value) -> Result<Vec<Box<dyn QueryExpr>>> {
    let args = term_args(term);
    if args.is_empty() {
        return Err(Error::Parse(format!(
            "'{name}' must have at least one subexpression"
        )));
    }
    args.iter().map(|sub| expr_parse(ctx, sub)).collect()
}

fn parse_allof(ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(AllOfExpr(parse_subexpressions(ctx, "allof", term)?)))
}

fn parse_anyof(ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(AnyOfExpr(parse_subexpressions(ctx, "anyof", term)?)))
}

pub(super) fn register() {
    register_expression_parser("true", parse_true);
    register_expression_parser("false", parse_false);
    register_expression_parser("not", parse_not);
    register_expression_parser("allof", parse_allof);
    register_expression_parser("anyof", parse_anyof);
}
