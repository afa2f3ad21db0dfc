//! Value types for the data phase.
//!
//! [`RawValue`] is what an introspector hands to the row converter: text
//! in the source's literal format, raw bytes for binary columns, or NULL.
//! [`Value`] is the converted, target-native value carried by mutations.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A value read from a source, before conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawValue {
    /// SQL NULL.
    Null,
    /// Textual literal in the source dialect's format.
    Text(String),
    /// Binary payload (blob/bytea/varbinary).
    Bytes(Vec<u8>),
}

impl RawValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Approximate size used for bad-row sampling.
    pub fn len(&self) -> usize {
        match self {
            RawValue::Null => 0,
            RawValue::Text(s) => s.len(),
            RawValue::Bytes(b) => b.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render for reports and error messages.
    pub fn display(&self) -> String {
        match self {
            RawValue::Null => "NULL".to_string(),
            RawValue::Text(s) => s.clone(),
            RawValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        }
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl From<Option<String>> for RawValue {
    fn from(v: Option<String>) -> Self {
        v.map(RawValue::Text).unwrap_or(RawValue::Null)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(v: Vec<u8>) -> Self {
        RawValue::Bytes(v)
    }
}

/// A target-native value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL; only appears as an array element.
    Null,
    Bool(bool),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// Approximate serialized size in bytes, used for write-unit budgets.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Bool(_) => 1,
            Value::Int64(_) | Value::Float64(_) | Value::Timestamp(_) => 8,
            Value::Float32(_) | Value::Date(_) => 4,
            Value::Numeric(_) => 16,
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Json(j) => j.to_string().len(),
            Value::Array(items) => items.iter().map(Value::encoded_len).sum::<usize>() + 8,
        }
    }

    /// Render as literal text for reports and logs.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Float32(f) => f.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::Numeric(d) => d.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("0x{}", hex::encode(b)),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::Json(j) => j.to_string(),
            Value::Array(items) => format!(
                "[{}]",
                items.iter().map(Value::display).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Numeric(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}
