//! Integer comparison terms: `size`, `mtime`, `ctime`.
//!
//! A comparison accepts either a bare integer (treated as equality) or an
//! `[operator, operand]` pair with one of the six operators `eq ne ge gt
//! le lt`. Any other token fails with `BadOperator`.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::view::FileNode;

use super::context::QueryContext;
use super::expr::{register_expression_parser, term_args, ParseCtx, QueryExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl IcmpOp {
    fn parse(token: &str) -> Result<Self> {
        match token {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "gt" => Ok(Self::Gt),
            "ge" => Ok(Self::Ge),
            "lt" => Ok(Self::Lt),
            "le" => Ok(Self::Le),
            other => Err(Error::BadOperator(format!(
                "unknown comparison operator '{other}'"
            ))),
        }
    }
}

/// A parsed integer comparison.
#[derive(Debug, Clone, Copy)]
pub struct IntCompare {
    pub op: IcmpOp,
    pub operand: i64,
}

impl IntCompare {
    /// Parses the argument tail of a comparison term.
    pub fn parse(args: &[Value]) -> Result<Self> {
        match args {
            [value] => {
                let operand = value.as_i64().ok_or_else(|| {
                    Error::BadOperator(format!("comparison operand must be an integer, got {value}"))
                })?;
                Ok(Self {
                    op: IcmpOp::Eq,
                    operand,
                })
            }
            [op, value] => {
                let token = op.as_str().ok_or_else(|| {
                    Error::BadOperator(format!("comparison operator must be a string, got {op}"))
                })?;
                let operand = value.as_i64().ok_or_else(|| {
                    Error::BadOperator(format!("comparison operand must be an integer, got {value}"))
                })?;
                Ok(Self {
                    op: IcmpOp::parse(token)?,
                    operand,
                })
            }
            _ => Err(Error::BadOperator(
                "expected an integer or [operator, integer]".into(),
            )),
        }
    }

    pub fn eval(&self, value: i64) -> bool {
        match self.op {
            IcmpOp::Eq => value == self.operand,
            IcmpOp::Ne => value != self.operand,
            IcmpOp::Gt => value > self.operand,
            IcmpOp::Ge => value >= self.operand,
            IcmpOp::Lt => value < self.operand,
            IcmpOp::Le => value <= self.operand,
        }
    }
}

#[derive(Debug)]
struct SizeExpr {
    cmp: IntCompare,
}

impl QueryExpr for SizeExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        // Deleted files have no current size.
        file.exists && self.cmp.eval(file.stat.size as i64)
    }
}

#[derive(Debug, Clone, Copy)]
enum TimeField {
    Mtime,
    Ctime,
}

#[derive(Debug)]
struct TimeExpr {
    field: TimeField,
    cmp: IntCompare,
}

impl QueryExpr for TimeExpr {
    fn evaluate(&self, _ctx: &mut QueryContext<'_>, file: &FileNode) -> bool {
        let value = match self.field {
            TimeField::Mtime => file.stat.mtime,
            TimeField::Ctime => file.stat.ctime,
        };
        self.cmp.eval(value)
    }
}

fn parse_size(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(SizeExpr {
        cmp: IntCompare::parse(term_args(term))?,
    }))
}

fn parse_mtime(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(TimeExpr {
        field: TimeField::Mtime,
        cmp: IntCompare::parse(term_args(term))?,
    }))
}

fn parse_ctime(_ctx: &ParseCtx, term: &Value) -> Result<Box<dyn QueryExpr>> {
    Ok(Box::new(TimeExpr {
        field: TimeField::Ctime,
        cmp: IntCompare::parse(term_args(term))?,
    }))
}

pub(super) fn register() {
    register_expression_parser("size", parse_size);
    register_expression_parser("mtime", parse_mtime);
    register_expression_parser("ctime", parse_ctime);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_integer_means_equality() {
        let cmp = IntCompare::parse(&[json!(42)]).unwrap();
        assert_eq!(cmp.op, IcmpOp::Eq);
        assert!(cmp.eval(42));
        assert!(!cmp.eval(43));
    }

    #[test]
    fn all_six_operators() {
        for (token, value, expect) in [
            ("eq", 10, true),
            ("ne", 10, false),
            ("gt", 11, true),
            ("ge", 10, true),
            ("lt", 9, true),
            ("le", 10, true),
        ] {
            let cmp = IntCompare::parse(&[json!(token), json!(10)]).unwrap();
            assert_eq!(cmp.eval(value), expect, "op {token}");
        }
    }

    #[test]
    fn invalid_operator_is_bad_operator() {
        let err = IntCompare::parse(&[json!("between"), json!(1)]).unwrap_err();
        assert!(matches!(err, Error::BadOperator(_)));
    }

    #[test]
    fn invalid_operand_shape_is_bad_operator() {
        assert!(matches!(
            IntCompare::parse(&[json!("three")]).unwrap_err(),
            Error::BadOperator(_)
        ));
        assert!(matches!(
            IntCompare::parse(&[]).unwrap_err(),
            Error::BadOperator(_)
        ));
        assert!(matches!(
            IntCompare::parse(&[json!("ge"), json!("x"), json!(1)]).unwrap_err(),
            Error::BadOperator(_)
        ));
    }
}
