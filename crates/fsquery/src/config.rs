//! Named configuration values, read through an opaque lookup.
//!
//! The core does not load configuration itself; callers hand it a `Config`
//! assembled elsewhere (typically from a JSON document) and the engine reads
//! the handful of values it consumes by name.

use std::collections::HashMap;

use serde_json::Value;

/// Initial capacity hint for the watcher's registration map.
pub const HINT_NUM_DIRS: &str = "hint_num_dirs";
const DEFAULT_HINT_NUM_DIRS: i64 = 128 * 1024;

/// Upper bound on events drained per `consume_notify` call.
pub const NOTIFY_BATCH_LIMIT: &str = "notify_batch_limit";
const DEFAULT_NOTIFY_BATCH_LIMIT: i64 = 16384;

/// Opaque name → value lookup for engine tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: HashMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from a JSON object. Non-object values yield an empty
    /// config; unknown keys are retained for forward compatibility.
    pub fn from_json(doc: &Value) -> Self {
        let values = doc
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self { values }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn hint_num_dirs(&self) -> usize {
        self.get_int(HINT_NUM_DIRS, DEFAULT_HINT_NUM_DIRS).max(0) as usize
    }

    pub fn notify_batch_limit(&self) -> usize {
        self.get_int(NOTIFY_BATCH_LIMIT, DEFAULT_NOTIFY_BATCH_LIMIT)
            .max(1) as usize
    }
}
