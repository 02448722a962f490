//! End-to-end pipeline execution: determinism, fusion contracts, failure recording.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use blockbench_core::engine::{Batch, Matrix, Splits};
use blockbench_core::engine::params::Config;
use blockbench_core::{
    BenchError, BlockCategory, Caller, ComputationError, DataLoaderRegistry, DatasetSource,
    ExecutionEngine, MetricsReport, RunStatus, ValidationError, VersionDraft,
};
use serde_json::json;

fn metrics_of(run: &blockbench_core::RunRecord) -> MetricsReport {
    serde_json::from_value(run.metrics.clone().expect("metrics recorded")).unwrap()
}

#[tokio::test]
async fn reference_pipeline_end_to_end() {
    let bench = common::bench().await;
    let spec = common::pinned(&bench, &common::spec(7, "fusions.concat", 16, 16)).await;

    let run = bench.runs.submit(&spec).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded, "error: {:?}", run.error);
    let metrics = metrics_of(&run);

    assert!(metrics.performance.accuracy > 0.6);
    assert!(metrics.performance.accuracy <= 1.0);
    assert_eq!(metrics.complexity.param_count, 16 * 20 + 16 + 16 * 30 + 16 + (32 + 1));
    assert!(metrics.complexity.train_time_ms > 0.0);
    assert_eq!(metrics.robustness.noise_std, 0.2);
    assert!(
        metrics.robustness.noisy_accuracy <= metrics.performance.accuracy + 0.05,
        "noisy {} vs clean {}",
        metrics.robustness.noisy_accuracy,
        metrics.performance.accuracy
    );
    let drop = metrics.performance.accuracy - metrics.robustness.noisy_accuracy;
    assert!((metrics.robustness.accuracy_drop - drop).abs() < 1e-12);

    let stored = bench.runs.get_run(&run.run_id).await.unwrap();
    assert_eq!(stored, run);
}

#[tokio::test]
async fn same_seed_same_metrics() {
    let bench = common::bench().await;
    let spec = common::pinned(&bench, &common::spec(42, "fusions.concat", 16, 16)).await;

    let first = metrics_of(&bench.runs.submit(&spec).await.unwrap());
    let second = metrics_of(&bench.runs.submit(&spec).await.unwrap());
    assert_eq!(first.performance, second.performance);
    assert_eq!(first.robustness, second.robustness);
    assert_eq!(first.complexity.param_count, second.complexity.param_count);
}

#[tokio::test]
async fn concat_widths_add_up() {
    let bench = common::bench().await;
    let spec = common::pinned(&bench, &common::spec(3, "fusions.concat", 16, 8)).await;
    let run = bench.runs.submit(&spec).await.unwrap();
    let metrics = metrics_of(&run);
    // fused width 24, binary classifier adds 24 weights + 1 intercept
    assert_eq!(metrics.complexity.param_count, (20 * 16 + 16) + (30 * 8 + 8) + 25);
}

#[tokio::test]
async fn sum_fusion_width_mismatch_fails_the_run() {
    let bench = common::bench().await;
    let spec = common::pinned(&bench, &common::spec(3, "fusions.sum", 16, 8)).await;
    let run = bench.runs.submit(&spec).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.error.as_deref(),
        Some("Sum fusion requires equal embedding dims (got 16 and 8).")
    );
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn one_encoder_is_an_incomplete_pipeline() {
    let bench = common::bench().await;
    let mut spec = common::spec(1, "fusions.concat", 16, 16);
    spec.graph.nodes.retain(|n| n.id != "encV");
    spec.graph
        .edges
        .retain(|e| e.from.node_id != "encV" && e.to.node_id != "encV");
    let spec = common::pinned(&bench, &spec).await;

    let err = bench.runs.submit(&spec).await.unwrap_err();
    match err {
        BenchError::Validation(ValidationError::IncompletePipeline { role, .. }) => {
            assert_eq!(role, "encoder")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(bench.runs.list_runs(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn identity_encoders_carry_no_parameters() {
    let bench = common::bench().await;
    let mut spec = common::spec(5, "fusions.concat", 16, 16);
    for id in ["encA", "encV"] {
        let node = spec.graph.nodes.iter_mut().find(|n| n.id == id).unwrap();
        node.block_ref.block_id = "unimodals.identity".to_string();
        node.config.remove("outDim");
    }
    let spec = common::pinned(&bench, &spec).await;
    let metrics = metrics_of(&bench.runs.submit(&spec).await.unwrap());
    // 20 audio + 30 vision features, one weight vector plus intercept
    assert_eq!(metrics.complexity.param_count, 51);
}

/// Dataset whose labels are all the same class.
struct SingleClass;

impl DatasetSource for SingleClass {
    fn slug(&self) -> &str {
        "datasets.single_class"
    }

    fn load(&self, _seed: u64, _config: &Config) -> Result<Splits, ComputationError> {
        let batch = |rows: usize| Batch {
            modalities: BTreeMap::from([
                ("audio".to_string(), Matrix::from_fn(rows, 4, |r, c| (r + c) as f64)),
                ("vision".to_string(), Matrix::from_fn(rows, 4, |r, c| (r * c) as f64)),
            ]),
            labels: Some(vec![1; rows]),
            meta: serde_json::Map::new(),
        };
        Ok(Splits {
            train: batch(20),
            test: batch(5),
        })
    }
}

#[tokio::test]
async fn single_class_dataset_fails_the_run_with_a_message() {
    let mut loaders = DataLoaderRegistry::with_defaults();
    loaders.register(Arc::new(SingleClass));
    let bench = common::bench_with(ExecutionEngine::new(loaders)).await;

    let sys = Caller::system();
    bench
        .registry
        .register_or_update_block(&sys, "datasets.single_class", BlockCategory::Dataset, "Single", "")
        .await
        .unwrap();
    bench
        .registry
        .publish_version(&sys, "datasets.single_class", VersionDraft::new("1.0.0", json!({}), json!({})))
        .await
        .unwrap();

    let mut spec = common::spec(9, "fusions.concat", 4, 4);
    let ds = spec.graph.nodes.iter_mut().find(|n| n.id == "ds").unwrap();
    ds.block_ref.block_id = "datasets.single_class".to_string();
    ds.block_ref.version = "1.0.0".to_string();
    let spec = common::pinned(&bench, &spec).await;

    let run = bench.runs.submit(&spec).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    let (started, finished) = (run.started_at.unwrap(), run.finished_at.unwrap());
    assert!(finished >= started);
    let error = run.error.unwrap();
    assert!(error.starts_with("training failed"), "{error}");
}
