//! Caller identity for mutating entry points.
//!
//! Transport layers authenticate however they like and hand the core a
//! [`Caller`]. The core only asks whether that caller is privileged.

use crate::domain::error::{BenchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Privileged { principal: String },
    Anonymous,
}

impl Caller {
    /// In-process trusted caller (seeding, daemon).
    pub fn system() -> Self {
        Caller::Privileged {
            principal: "system".to_string(),
        }
    }

    /// Resolve a presented credential against the configured admin key.
    ///
    /// With no admin key configured nobody is privileged.
    pub fn from_key(presented: Option<&str>, admin_key: Option<&str>) -> Self {
        match (presented, admin_key) {
            (Some(p), Some(k)) if !k.is_empty() && p == k => Caller::Privileged {
                principal: "admin".to_string(),
            },
            _ => Caller::Anonymous,
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Caller::Privileged { .. })
    }

    pub fn principal(&self) -> &str {
        match self {
            Caller::Privileged { principal } => principal,
            Caller::Anonymous => "anonymous",
        }
    }

    /// Fail with `Forbidden` unless privileged.
    pub fn require_privileged(&self, action: &str) -> Result<()> {
        if self.is_privileged() {
            Ok(())
        } else {
            Err(BenchError::Forbidden(format!(
                "{action} requires a privileged credential"
            )))
        }
    }
}
