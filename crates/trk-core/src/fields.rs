//! Typed accessors over a JSON field mapping, shared by the record types.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::RecordError;

pub(crate) type Fields = Map<String, Value>;

fn invalid(field: &'static str, expected: &str, got: &Value) -> RecordError {
    RecordError::InvalidField {
        field,
        reason: format!("expected {expected}, got {got}"),
    }
}

fn present<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

pub(crate) fn required_str(fields: &Fields, name: &'static str) -> Result<String, RecordError> {
    match present(fields, name) {
        None => Err(RecordError::MissingField(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(invalid(name, "a string", other)),
    }
}

/// Empty strings read as unset.
pub(crate) fn optional_str(fields: &Fields, name: &'static str) -> Result<Option<String>, RecordError> {
    match present(fields, name) {
        None => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(name, "a string", other)),
    }
}

pub(crate) fn optional_path(fields: &Fields, name: &'static str) -> Result<Option<PathBuf>, RecordError> {
    Ok(optional_str(fields, name)?.map(PathBuf::from))
}

pub(crate) fn bool_or(fields: &Fields, name: &'static str, default: bool) -> Result<bool, RecordError> {
    match present(fields, name) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(name, "a boolean", other)),
    }
}

pub(crate) fn string_list(fields: &Fields, name: &'static str) -> Result<Vec<String>, RecordError> {
    match present(fields, name) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(invalid(name, "a list of strings", other)),
            })
            .collect(),
        Some(other) => Err(invalid(name, "a list", other)),
    }
}

pub(crate) fn optional_object(fields: &Fields, name: &'static str) -> Result<Option<Map<String, Value>>, RecordError> {
    match present(fields, name) {
        None => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(other) => Err(invalid(name, "an object", other)),
    }
}

pub(crate) fn timestamp(fields: &Fields, name: &'static str) -> Result<Option<DateTime<Utc>>, RecordError> {
    match present(fields, name) {
        None => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| RecordError::InvalidField {
                field: name,
                reason: e.to_string(),
            }),
        Some(other) => Err(invalid(name, "an RFC 3339 timestamp", other)),
    }
}

pub(crate) fn str_value(s: Option<&str>) -> Value {
    s.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null)
}

pub(crate) fn path_value(p: Option<&Path>) -> Value {
    p.map(|p| Value::String(p.to_string_lossy().into_owned())).unwrap_or(Value::Null)
}

pub(crate) fn time_value(t: &DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339())
}
