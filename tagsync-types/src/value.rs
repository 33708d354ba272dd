//! Live tag values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value read from (or written to) a variable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TagValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<TagValue>),
}

impl TagValue {
    /// Converts the value to a shape every store column accepts.
    ///
    /// Arrays become JSON text, unsigned values that do not fit in `i64`
    /// become text and non-finite floats become `Null`.
    #[must_use]
    pub fn to_storable(&self) -> TagValue {
        match self {
            TagValue::UInt(v) => match i64::try_from(*v) {
                Ok(i) => TagValue::Int(i),
                Err(_) => TagValue::Text(v.to_string()),
            },
            TagValue::Float(f) if !f.is_finite() => TagValue::Null,
            TagValue::Array(items) => TagValue::Text(array_json(items).to_string()),
            other => other.clone(),
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, TagValue::Null)
    }

    /// Name of the variant, as a declared-type hint.
    pub fn kind(&self) -> &'static str {
        match self {
            TagValue::Null => "Null",
            TagValue::Bool(_) => "Boolean",
            TagValue::Int(_) => "Int64",
            TagValue::UInt(_) => "UInt64",
            TagValue::Float(_) => "Double",
            TagValue::Text(_) => "String",
            TagValue::Timestamp(_) => "DateTime",
            TagValue::Array(_) => "Array",
        }
    }
}

fn array_json(items: &[TagValue]) -> serde_json::Value {
    serde_json::Value::Array(items.iter().map(to_json).collect())
}

fn to_json(value: &TagValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        TagValue::Null => Value::Null,
        TagValue::Bool(b) => Value::Bool(*b),
        TagValue::Int(i) => Value::from(*i),
        TagValue::UInt(u) => Value::from(*u),
        TagValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        TagValue::Text(s) => Value::String(s.clone()),
        TagValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        TagValue::Array(items) => array_json(items),
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Null => f.write_str("null"),
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::UInt(u) => write!(f, "{u}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Text(s) => f.write_str(s),
            TagValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            TagValue::Array(items) => write!(f, "{}", array_json(items)),
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}
