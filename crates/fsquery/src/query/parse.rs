//! Parsing the JSON-shaped query description into a [`Query`].
//!
//! Parse errors are returned to the caller and never surface during
//! execution; the message names the offending field.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::strings::StringRef;

use super::expr::{expr_parse, init_all, ParseCtx};
use super::glob::{GlobFlags, GlobTree};
use super::{default_field_list, ClockSpec, FieldList, Query, QueryField, QueryPath, DEPTH_UNLIMITED};

impl ClockSpec {
    /// Parses a since specification: an integer timestamp, a
    /// `c:<root_number>:<ticks>` or `n:<name>` string, or an object with
    /// `clock` ticks and an optional `root` number.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Number(_) => {
                let ts = value.as_i64().ok_or_else(|| {
                    Error::Parse(format!("since: timestamp {value} is out of range"))
                })?;
                Ok(Self::Timestamp(ts))
            }
            Value::String(spec) => {
                if let Some(name) = spec.strip_prefix("n:") {
                    if name.is_empty() {
                        return Err(Error::Parse("since: named cursor must not be empty".into()));
                    }
                    return Ok(Self::Named(name.to_string()));
                }
                if let Some(clock) = spec.strip_prefix("c:") {
                    let (root, ticks) = clock.split_once(':').ok_or_else(|| {
                        Error::Parse(format!("since: malformed clock string '{spec}'"))
                    })?;
                    let root_number = root.parse::<u32>().map_err(|_| {
                        Error::Parse(format!("since: bad root number in '{spec}'"))
                    })?;
                    let ticks = ticks.parse::<u32>().map_err(|_| {
                        Error::Parse(format!("since: bad tick value in '{spec}'"))
                    })?;
                    return Ok(Self::Clock {
                        root_number: Some(root_number),
                        ticks,
                    });
                }
                Err(Error::Parse(format!(
                    "since: unrecognized clock string '{spec}'"
                )))
            }
            Value::Object(obj) => {
                let ticks = obj
                    .get("clock")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::Parse("since: object form requires 'clock' ticks".into()))?
                    as u32;
                let root_number = match obj.get("root") {
                    Some(root) => Some(root.as_u64().ok_or_else(|| {
                        Error::Parse("since: 'root' must be an unsigned integer".into())
                    })? as u32),
                    None => None,
                };
                Ok(Self::Clock { root_number, ticks })
            }
            other => Err(Error::Parse(format!(
                "since: expected number, string, or object, got {other}"
            ))),
        }
    }
}

fn get_bool(obj: &serde_json::Map<String, Value>, key: &str, default: bool) -> Result<bool> {
    match obj.get(key) {
        None => Ok(default),
        Some(Value::Bool(value)) => Ok(*value),
        Some(other) => Err(Error::Parse(format!("{key}: expected a boolean, got {other}"))),
    }
}

fn get_millis(obj: &serde_json::Map<String, Value>, key: &str, default_ms: u64) -> Result<Duration> {
    match obj.get(key) {
        None => Ok(Duration::from_millis(default_ms)),
        Some(value) => {
            let ms = value.as_u64().ok_or_else(|| {
                Error::Parse(format!("{key}: expected milliseconds, got {value}"))
            })?;
            Ok(Duration::from_millis(ms))
        }
    }
}

fn parse_paths(value: &Value) -> Result<Vec<QueryPath>> {
    let list = value
        .as_array()
        .ok_or_else(|| Error::Parse("path: expected an array".into()))?;
    let mut paths = Vec::with_capacity(list.len());
    for entry in list {
        let path = match entry {
            Value::String(name) => QueryPath {
                name: name.trim_matches('/').to_string(),
                depth: DEPTH_UNLIMITED,
            },
            Value::Object(obj) => {
                let name = obj
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Parse("path: object form requires a 'path' name".into()))?;
                let depth = match obj.get("depth") {
                    None => DEPTH_UNLIMITED,
                    Some(depth) => {
                        let depth = depth.as_i64().ok_or_else(|| {
                            Error::Parse(format!("path: depth must be an integer, got {depth}"))
                        })?;
                        match depth {
                            -1 => DEPTH_UNLIMITED,
                            d if d < 0 => {
                                return Err(Error::InvalidPath(format!(
                                    "path '{name}' has negative depth {d}"
                                )))
                            }
                            d => d as u32,
                        }
                    }
                };
                QueryPath {
                    name: name.trim_matches('/').to_string(),
                    depth,
                }
            }
            other => {
                return Err(Error::Parse(format!(
                    "path: entries must be strings or objects, got {other}"
                )))
            }
        };
        paths.push(path);
    }
    Ok(paths)
}

fn parse_suffixes(value: &Value) -> Result<Vec<StringRef>> {
    let collect = |s: &str| StringRef::from(s.to_ascii_lowercase());
    match value {
        Value::String(suffix) => Ok(vec![collect(suffix)]),
        Value::Array(list) => list
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(collect)
                    .ok_or_else(|| Error::Parse("suffix: entries must be strings".into()))
            })
            .collect(),
        other => Err(Error::Parse(format!(
            "suffix: expected a string or array, got {other}"
        ))),
    }
}

/// Parses a field list; unknown field names fail.
pub(crate) fn parse_field_list(value: &Value) -> Result<FieldList> {
    let list = value
        .as_array()
        .ok_or_else(|| Error::Parse("fields: expected an array".into()))?;
    let mut fields = Vec::with_capacity(list.len());
    for entry in list {
        let name = entry
            .as_str()
            .ok_or_else(|| Error::Parse("fields: entries must be strings".into()))?;
        let field = QueryField::parse(name)
            .ok_or_else(|| Error::Parse(format!("fields: unknown field '{name}'")))?;
        fields.push(field);
    }
    Ok(fields)
}

/// Parses a query description into an executable [`Query`].
pub fn parse_query(spec: &Value) -> Result<Query> {
    init_all();
    let obj = spec
        .as_object()
        .ok_or_else(|| Error::Parse("query must be an object".into()))?;

    let case_sensitive = get_bool(obj, "case_sensitive", true)?;
    let mut query = Query {
        case_sensitive,
        empty_on_fresh_instance: get_bool(obj, "empty_on_fresh_instance", false)?,
        dedup_results: get_bool(obj, "dedup_results", false)?,
        sync_timeout: get_millis(obj, "sync_timeout", 0)?,
        lock_timeout: get_millis(obj, "lock_timeout", 1_000)?,
        ..Default::default()
    };

    if let Some(value) = obj.get("relative_root") {
        let rel = value
            .as_str()
            .ok_or_else(|| Error::Parse(format!("relative_root: expected a string, got {value}")))?;
        let rel = rel.trim_matches('/');
        if !rel.is_empty() {
            query.relative_root = Some(rel.to_string());
        }
    }

    if let Some(value) = obj.get("path") {
        query.paths = parse_paths(value)?;
    }
    if let Some(value) = obj.get("suffix") {
        query.suffixes = parse_suffixes(value)?;
    }
    if let Some(value) = obj.get("glob") {
        let list = value
            .as_array()
            .ok_or_else(|| Error::Parse("glob: expected an array".into()))?;
        let patterns: Result<Vec<String>> = list
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Parse("glob: entries must be strings".into()))
            })
            .collect();
        let flags = GlobFlags {
            case_sensitive,
            include_dot_files: get_bool(obj, "glob_includedotfiles", true)?,
        };
        query.glob_tree = Some(GlobTree::compile(&patterns?, flags)?);
    }
    if let Some(value) = obj.get("since") {
        query.since_spec = Some(ClockSpec::parse(value)?);
    }
    if let Some(value) = obj.get("expression") {
        let ctx = ParseCtx { case_sensitive };
        query.expr = Some(expr_parse(&ctx, value)?);
    }
    query.fields = match obj.get("fields") {
        Some(value) => parse_field_list(value)?,
        None => default_field_list(),
    };

    Ok(query)
}
