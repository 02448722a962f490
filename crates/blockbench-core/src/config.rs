//! Process configuration read from the environment.

use tracing::Level;

/// Core settings shared by the CLI and the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Credential that makes a caller privileged. `None` disables privileged access.
    pub admin_key: Option<String>,
    /// Number of async run workers
    pub workers: usize,
    /// Emit JSON log lines instead of text
    pub log_json: bool,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: Level,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            admin_key: None,
            workers: 2,
            log_json: false,
            log_level: Level::INFO,
        }
    }
}

impl BenchConfig {
    /// Read `BLOCKBENCH_ADMIN_KEY`, `BLOCKBENCH_WORKERS`, `BLOCKBENCH_LOG_FORMAT`
    /// and `BLOCKBENCH_LOG_LEVEL`. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        BenchConfig {
            admin_key: lookup("BLOCKBENCH_ADMIN_KEY").filter(|k| !k.is_empty()),
            workers: lookup("BLOCKBENCH_WORKERS")
                .and_then(|w| w.parse::<usize>().ok())
                .filter(|w| *w > 0)
                .unwrap_or(defaults.workers),
            log_json: lookup("BLOCKBENCH_LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
            log_level: lookup("BLOCKBENCH_LOG_LEVEL")
                .and_then(|l| l.parse::<Level>().ok())
                .unwrap_or(defaults.log_level),
        }
    }

    /// Set the admin key
    pub fn with_admin_key(mut self, key: &str) -> Self {
        self.admin_key = Some(key.to_string());
        self
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_values() {
        let cfg = BenchConfig::from_lookup(lookup(&[
            ("BLOCKBENCH_ADMIN_KEY", "s3cret"),
            ("BLOCKBENCH_WORKERS", "4"),
            ("BLOCKBENCH_LOG_FORMAT", "JSON"),
            ("BLOCKBENCH_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(cfg.admin_key.as_deref(), Some("s3cret"));
        assert_eq!(cfg.workers, 4);
        assert!(cfg.log_json);
        assert_eq!(cfg.log_level, Level::DEBUG);
    }

    #[test]
    fn bad_values_fall_back() {
        let cfg = BenchConfig::from_lookup(lookup(&[
            ("BLOCKBENCH_ADMIN_KEY", ""),
            ("BLOCKBENCH_WORKERS", "0"),
            ("BLOCKBENCH_LOG_LEVEL", "loud"),
        ]));
        assert_eq!(cfg, BenchConfig::default());
    }
}
