//! Field values
//!
//! Entity fields, static schema values and callable results are all
//! `serde_json::Value`s. This module holds the emptiness and text
//! conversion rules shared by the builder and the registry.

pub use serde_json::Value;

/// Whether a value counts as empty
///
/// Null, `false`, zero, the empty string, the string `"0"` and empty
/// containers are empty. Empty values are filtered out of field reads.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Collapse a composite value to the scalar that gets inserted
///
/// Objects yield their `value` member if present, otherwise their first
/// member; arrays yield their first item. Scalars are returned unchanged.
pub fn flatten(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("value") {
            Some(v) => v,
            None => map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
        },
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    }
}

/// Render a scalar value as element or attribute text
///
/// `true` renders as `1` and `false` as the empty string. Composite values
/// are flattened first.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some(String::new()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => to_text(&flatten(value.clone())),
    }
}

/// Render a value for diagnostics (`"Rex"`, `3`, `[..]`)
pub fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_empty() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(is_empty(&v), "{} should be empty", v);
        }
        for v in [json!(true), json!(1), json!("a"), json!(" "), json!([0]), json!({"a": null})] {
            assert!(!is_empty(&v), "{} should not be empty", v);
        }
    }

    #[test]
    fn test_flatten_prefers_value_member() {
        assert_eq!(flatten(json!({"format": "html", "value": "text"})), json!("text"));
        assert_eq!(flatten(json!({"iso2": "FR", "name": "France"})), json!("FR"));
        assert_eq!(flatten(json!(["a", "b"])), json!("a"));
        assert_eq!(flatten(json!({})), Value::Null);
        assert_eq!(flatten(json!(3)), json!(3));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!("Rex")).as_deref(), Some("Rex"));
        assert_eq!(to_text(&json!(12)).as_deref(), Some("12"));
        assert_eq!(to_text(&json!(true)).as_deref(), Some("1"));
        assert_eq!(to_text(&json!(false)).as_deref(), Some(""));
        assert_eq!(to_text(&json!({"value": 2.5})).as_deref(), Some("2.5"));
        assert_eq!(to_text(&Value::Null), None);
    }
}
