//! Node config checks against a locked input schema.
//!
//! Supports the JSON Schema subset the registry uses: `type`, `properties`,
//! `required`, `additionalProperties` (default true), `minimum`, `maximum`
//! and `minLength`. Unknown keywords are ignored.

use serde_json::Value;

use crate::domain::error::ValidationError;

/// Validate `config` for node `node_id` against `schema`.
pub fn check_config(node_id: &str, schema: &Value, config: &Value) -> Result<(), ValidationError> {
    check_value(schema, config, "").map_err(|(field, reason)| ValidationError::InvalidConfig {
        node_id: node_id.to_string(),
        field: if field.is_empty() {
            "config".to_string()
        } else {
            field
        },
        reason,
    })
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        _ => true,
    }
}

fn check_value(schema: &Value, value: &Value, path: &str) -> Result<(), (String, String)> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    match schema.get("type") {
        Some(Value::String(t)) if !type_matches(t, value) => {
            return Err((path.to_string(), format!("expected {t}")));
        }
        Some(Value::Array(types)) => {
            let ok = types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value));
            if !ok {
                return Err((path.to_string(), format!("expected one of {types:?}")));
            }
        }
        _ => {}
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err((path.to_string(), format!("must be >= {min}")));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err((path.to_string(), format!("must be <= {max}")));
            }
        }
    }

    if let (Some(s), Some(min_len)) = (value.as_str(), schema.get("minLength").and_then(Value::as_u64)) {
        if (s.chars().count() as u64) < min_len {
            return Err((path.to_string(), format!("must have length >= {min_len}")));
        }
    }

    if let Some(obj) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(key) {
                    return Err((join(path, key), "is required".to_string()));
                }
            }
        }

        let additional = schema.get("additionalProperties");
        for (key, child) in obj {
            match properties.and_then(|p| p.get(key)) {
                Some(child_schema) => check_value(child_schema, child, &join(path, key))?,
                None => match additional {
                    Some(Value::Bool(false)) => {
                        return Err((join(path, key), "unknown field".to_string()));
                    }
                    Some(extra @ Value::Object(_)) => check_value(extra, child, &join(path, key))?,
                    _ => {}
                },
            }
        }
    }
    Ok(())
}
