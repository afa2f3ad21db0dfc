//! Parsing of source literals into target values.
//!
//! Sources hand over text in their own literal formats. The target type
//! decides how the text is read; the source dialect only matters for the
//! array and binary spellings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;

use crate::core::value::{RawValue, Value};
use crate::target::schema::{TargetType, TypeCode};
use crate::typemap::SourceDialect;

/// Timestamp formats carrying an offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f %#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
];

/// Local timestamp formats, read as UTC.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Convert one non-NULL raw value to the target type.
pub fn convert_value(
    raw: &RawValue,
    ty: &TargetType,
    dialect: SourceDialect,
) -> std::result::Result<Value, String> {
    let text = match raw {
        RawValue::Null => return Ok(Value::Null),
        RawValue::Bytes(bytes) if ty.code == TypeCode::Bytes && !ty.is_array => {
            return Ok(Value::Bytes(bytes.clone()));
        }
        RawValue::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map_err(|_| format!("invalid UTF-8 in binary value for {}", ty))?,
        RawValue::Text(text) => text.clone(),
    };

    if ty.is_array {
        let element = TargetType {
            is_array: false,
            ..ty.clone()
        };
        let items = parse_array(&text, dialect)?;
        let values = items
            .into_iter()
            .map(|item| match item {
                None => Ok(Value::Null),
                Some(item) => convert_scalar(&item, &element, dialect),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        return Ok(Value::Array(values));
    }

    convert_scalar(&text, ty, dialect)
}

fn convert_scalar(
    text: &str,
    ty: &TargetType,
    dialect: SourceDialect,
) -> std::result::Result<Value, String> {
    let value = match ty.code {
        TypeCode::Bool => Value::Bool(parse_bool(text)?),
        TypeCode::Int64 => Value::Int64(parse_int(text)?),
        TypeCode::Float32 => Value::Float32(
            text.trim()
                .parse::<f32>()
                .map_err(|e| format!("can't convert {:?} to FLOAT32: {}", text, e))?,
        ),
        TypeCode::Float64 => Value::Float64(
            text.trim()
                .parse::<f64>()
                .map_err(|e| format!("can't convert {:?} to FLOAT64: {}", text, e))?,
        ),
        TypeCode::Numeric => Value::Numeric(parse_numeric(text)?),
        TypeCode::String => Value::String(text.to_string()),
        TypeCode::Bytes => Value::Bytes(parse_bytes(text, dialect)?),
        TypeCode::Date => Value::Date(parse_date(text)?),
        TypeCode::Timestamp => Value::Timestamp(parse_timestamp(text)?),
        TypeCode::Json => Value::Json(
            serde_json::from_str(text)
                .map_err(|e| format!("can't convert {:?} to JSON: {}", text, e))?,
        ),
    };
    Ok(value)
}

pub fn parse_bool(text: &str) -> std::result::Result<bool, String> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" | "b'1'" | "0x1" | "0x01" => Ok(true),
        "false" | "f" | "0" | "no" | "n" | "off" | "b'0'" | "0x0" | "0x00" => Ok(false),
        _ => Err(format!("can't convert {:?} to BOOL", text)),
    }
}

pub fn parse_int(text: &str) -> std::result::Result<i64, String> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    // MySQL bit literal.
    if let Some(bits) = trimmed.strip_prefix("b'").and_then(|s| s.strip_suffix('\'')) {
        return i64::from_str_radix(bits, 2).map_err(|e| format!("bad bit literal {:?}: {}", text, e));
    }
    if let Some(hex) = trimmed.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).map_err(|e| format!("bad hex literal {:?}: {}", text, e));
    }
    // Time of day stored as nanoseconds since midnight.
    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f") {
        return Ok(i64::from(time.num_seconds_from_midnight()) * 1_000_000_000
            + i64::from(time.nanosecond()));
    }
    Err(format!("can't convert {:?} to INT64", text))
}

pub fn parse_numeric(text: &str) -> std::result::Result<Decimal, String> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| format!("can't convert {:?} to NUMERIC: {}", text, e))
}

/// Decode binary literals: `\x..` (PostgreSQL bytea), `0x..` (MySQL,
/// Cassandra, SQL Server). Anything else is taken as raw UTF-8 bytes.
pub fn parse_bytes(text: &str, dialect: SourceDialect) -> std::result::Result<Vec<u8>, String> {
    let hex_digits = match dialect {
        SourceDialect::Postgres => text.strip_prefix("\\x"),
        _ => text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")),
    };
    match hex_digits {
        Some(digits) => {
            hex::decode(digits).map_err(|e| format!("bad hex literal {:?}: {}", text, e))
        }
        None => Ok(text.as_bytes().to_vec()),
    }
}

pub fn parse_date(text: &str) -> std::result::Result<NaiveDate, String> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| parse_timestamp(trimmed).map(|ts| ts.date_naive()))
        .map_err(|_| format!("can't convert {:?} to DATE", text))
}

/// Parse a timestamp. Offsets are honored; local values are read as UTC.
pub fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    let trimmed = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(trimmed, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    for format in LOCAL_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(format!("can't convert {:?} to TIMESTAMP", text))
}

/// Split an array literal into elements; `None` marks a NULL element.
///
/// Accepts PostgreSQL `{a,"b c",NULL}`, JSON arrays, and the bracketed
/// lists of CQL (`[1, 2]`, `['a', 'b']`).
pub fn parse_array(
    text: &str,
    dialect: SourceDialect,
) -> std::result::Result<Vec<Option<String>>, String> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && dialect != SourceDialect::Cassandra {
        return parse_pg_array(trimmed);
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            return Ok(items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                })
                .collect());
        }
        return parse_bracketed(trimmed);
    }
    Err(format!("can't parse {:?} as an array", text))
}

fn parse_pg_array(text: &str) -> std::result::Result<Vec<Option<String>>, String> {
    let body = text
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| format!("unterminated array literal {:?}", text))?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    if body.contains('{') {
        return Err(format!("multi-dimensional array literal {:?}", text));
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                was_quoted = true;
            }
            ',' if !quoted => {
                items.push(finish_pg_element(&current, was_quoted));
                current.clear();
                was_quoted = false;
            }
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(format!("unterminated quote in array literal {:?}", text));
    }
    items.push(finish_pg_element(&current, was_quoted));
    Ok(items)
}

fn finish_pg_element(raw: &str, was_quoted: bool) -> Option<String> {
    if was_quoted {
        return Some(raw.to_string());
    }
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("NULL") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bracketed(text: &str) -> std::result::Result<Vec<Option<String>>, String> {
    let body = text
        .strip_prefix(['[', '{'])
        .and_then(|s| s.strip_suffix([']', '}']))
        .ok_or_else(|| format!("unterminated list literal {:?}", text))?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            // CQL escapes a quote by doubling it.
            '\'' if quoted && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                items.push(finish_bracketed_element(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(format!("unterminated quote in list literal {:?}", text));
    }
    items.push(finish_bracketed_element(&current));
    Ok(items)
}

fn finish_bracketed_element(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}
