//! Canonical JSON normalization and block digest computation (RFC 8785-class).
//!
//! - UTF-16 code unit ordering for object keys (§3.2.3)
//! - Number normalization (integer-valued floats → integers; reject NaN/Infinity)
//! - SHA256 over the canonical form; block digests keep the first 16 hex chars

use crate::domain::error::{IntegrityError, Result, ValidationError};
use sha2::{Digest, Sha256};

/// Length of a block version fingerprint in hex characters.
pub const BLOCK_DIGEST_LEN: usize = 16;

/// Recursively sort JSON object keys using UTF-16 code unit ordering (RFC 8785 §3.2.3).
fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

/// Normalize numbers: integer-valued floats → integer repr; reject NaN/Infinity.
fn normalize_value(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map.iter() {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => {
            let normalized = arr
                .iter()
                .map(normalize_value)
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::Value::Array(normalized))
        }
        serde_json::Value::Number(n) if !(n.is_i64() || n.is_u64()) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(ValidationError::InvalidField {
                field: "schema".to_string(),
                reason: "NaN/Infinity not permitted in canonical JSON".to_string(),
            }
            .into()),
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
            }
            _ => Ok(serde_json::Value::Number(n.clone())),
        },
        other => Ok(other.clone()),
    }
}

/// Convert JSON value to canonical form: normalize numbers → sort keys → compact JSON.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    let sorted = sort_keys_utf16(&normalized);
    Ok(serde_json::to_string(&sorted)?)
}

/// Compute the full SHA256 hex digest of canonical JSON.
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint of a block version's identity and contract.
///
/// Covers `{slug, version, input_schema, output_schema}` and nothing else, so
/// changelog, permissions and status edits never move the digest.
pub fn compute_block_digest(
    slug: &str,
    version: &str,
    input_schema: &serde_json::Value,
    output_schema: &serde_json::Value,
) -> Result<String> {
    let payload = serde_json::json!({
        "slug": slug,
        "version": version,
        "input_schema": input_schema,
        "output_schema": output_schema,
    });
    let mut digest = compute_digest(&payload)?;
    digest.truncate(BLOCK_DIGEST_LEN);
    Ok(digest)
}

/// Check a claimed digest against the one stored for `slug@version`.
pub fn verify_block_digest(slug: &str, version: &str, stored: &str, claimed: &str) -> Result<()> {
    if stored != claimed {
        return Err(IntegrityError::DigestMismatch {
            slug: slug.to_string(),
            version: version.to_string(),
            expected: stored.to_string(),
            actual: claimed.to_string(),
        }
        .into());
    }
    Ok(())
}
