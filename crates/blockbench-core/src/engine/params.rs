//! Typed reads from a node's JSON config.

use serde_json::{Map, Value};

use crate::domain::error::ComputationError;

pub type Config = Map<String, Value>;

fn invalid(name: &str, reason: &str) -> ComputationError {
    ComputationError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

pub fn usize_or(config: &Config, key: &str, default: usize) -> Result<usize, ComputationError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(|n| n as usize)
            .ok_or_else(|| invalid(key, "expected a non-negative integer")),
    }
}

pub fn f64_or(config: &Config, key: &str, default: f64) -> Result<f64, ComputationError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| invalid(key, "expected a finite number")),
    }
}

pub fn str_opt<'a>(config: &'a Config, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
