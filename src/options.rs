//! Loosely typed request options, merged key by key.
//!
//! Client-wide defaults, descriptor defaults and per-call overrides all share
//! this shape. The request pipeline reads `path`, `method`, `json`, `headers`,
//! `timeout` and `inherit`; any other key is carried along untouched.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::commands::Method;

pub const PATH: &str = "path";
pub const METHOD: &str = "method";
pub const BODY: &str = "json";
pub const HEADERS: &str = "headers";
pub const TIMEOUT: &str = "timeout";
pub const INHERIT: &str = "inherit";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestOptions(Map<String, Value>);

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from a JSON value; anything but an object yields empty options.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn path(self, path: impl Into<String>) -> Self {
        self.set(PATH, path.into())
    }

    pub fn method(self, method: Method) -> Self {
        self.set(METHOD, method.as_str())
    }

    pub fn body(self, body: impl Into<Value>) -> Self {
        self.set(BODY, body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let headers = self
            .0
            .entry(HEADERS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !headers.is_object() {
            *headers = Value::Object(Map::new());
        }
        if let Value::Object(map) = headers {
            map.insert(name.into(), Value::String(value.into()));
        }
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.set(TIMEOUT, millis)
    }

    /// `inherit: false` opts out of client-wide defaults.
    pub fn inherit(self, inherit: bool) -> Self {
        self.set(INHERIT, inherit)
    }

    pub fn inherits(&self) -> bool {
        self.0.get(INHERIT).and_then(Value::as_bool).unwrap_or(true)
    }

    pub fn path_str(&self) -> Option<&str> {
        self.0.get(PATH).and_then(Value::as_str)
    }

    pub fn body_value(&self) -> Option<&Value> {
        self.0.get(BODY)
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.0
            .get(TIMEOUT)
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }

    /// String-valued entries of `headers`; other values are stringified.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let Some(Value::Object(map)) = self.0.get(HEADERS) else {
            return BTreeMap::new();
        };
        map.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// Overlays `other` on top of `self`; `other` wins on key conflicts.
    pub fn merge(&mut self, other: &RequestOptions) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RequestOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
