use serde_json::{Map, Value};

/// Raw option set handed to the request builder, keyed by option name.
pub type OptionMap = Map<String, Value>;

/// A value counts as set unless it is null, false, zero or empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Looks up `key` and returns it only when the value is truthy.
pub fn truthy<'a>(options: &'a OptionMap, key: &str) -> Option<&'a Value> {
    options.get(key).filter(|v| is_truthy(v))
}
