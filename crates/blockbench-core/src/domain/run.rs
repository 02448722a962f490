//! Run outcome types: metrics report, runtime environment and the public run view.

use blockbench_state::{RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the standardized batch contract every dataset loader produces.
pub const BATCH_CONTRACT: &str = "batch.multimodal.v1";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complexity {
    pub param_count: u64,
    pub train_time_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Robustness {
    pub noise_std: f64,
    pub noisy_accuracy: f64,
    /// clean accuracy minus noisy accuracy
    pub accuracy_drop: f64,
}

/// Metrics produced by one pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub performance: Performance,
    pub complexity: Complexity,
    pub robustness: Robustness,
}

impl MetricsReport {
    pub fn new(
        accuracy: f64,
        param_count: u64,
        train_time_ms: f64,
        noise_std: f64,
        noisy_accuracy: f64,
    ) -> Self {
        Self {
            performance: Performance { accuracy },
            complexity: Complexity {
                param_count,
                train_time_ms,
            },
            robustness: Robustness {
                noise_std,
                noisy_accuracy,
                accuracy_drop: accuracy - noisy_accuracy,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchContract {
    pub name: String,
}

/// Host and tooling descriptor recorded on every run for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEnv {
    pub engine_version: String,
    pub os: String,
    pub arch: String,
    pub family: String,
    pub packages: std::collections::BTreeMap<String, String>,
    pub batch_contract: BatchContract,
}

impl RuntimeEnv {
    pub fn collect() -> Self {
        let mut packages = std::collections::BTreeMap::new();
        packages.insert(
            "blockbench-core".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        packages.insert("rand".to_string(), "0.9".to_string());
        packages.insert("rand_distr".to_string(), "0.5".to_string());
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            packages,
            batch_contract: BatchContract {
                name: BATCH_CONTRACT.to_string(),
            },
        }
    }
}

/// Client-facing view of a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub run_id: String,
    pub pipeline_id: Option<String>,
    pub status: RunStatus,
    pub spec: serde_json::Value,
    pub locked_blocks: serde_json::Value,
    pub runtime_env: serde_json::Value,
    pub metrics: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<RunRecord> for RunView {
    fn from(r: RunRecord) -> Self {
        Self {
            run_id: r.run_id,
            pipeline_id: r.pipeline_id,
            status: r.status,
            spec: r.spec,
            locked_blocks: r.locked_blocks,
            runtime_env: r.runtime_env,
            metrics: r.metrics,
            error: r.error,
            created_at: r.created_at,
            started_at: r.started_at,
            finished_at: r.finished_at,
        }
    }
}
