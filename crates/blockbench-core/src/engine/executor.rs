//! Pipeline execution.
//!
//! One pass per run: load splits, encode both modalities, fuse, fit the
//! classifier on the train split, then score clean and noise-perturbed test
//! features. Every step is a pure function of `(spec, seed)` apart from the
//! wall-clock training time.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::domain::error::{ComputationError, Result};
use crate::domain::pipeline::PipelineSpec;
use crate::domain::run::MetricsReport;
use crate::engine::blocks::{
    Encoder, EncoderKind, EvaluatorParams, FusionKind, ObjectiveKind, TrainerParams,
};
use crate::engine::classifier::SgdClassifier;
use crate::engine::dataset::{DataLoaderRegistry, Splits};
use crate::engine::matrix::Matrix;
use crate::engine::resolver::{resolve, ResolvedEncoder, ResolvedGraph, ResolvedNode};

/// Salt added to the run seed for the robustness noise generator.
pub const NOISE_SALT: u64 = 999;

/// Hooks fired as execution advances. All default to no-ops.
///
/// Encoder and fusion hooks see the train split.
#[allow(unused_variables)]
pub trait ExecutionObserver {
    fn dataset(&mut self, node: &ResolvedNode, splits: &Splits) {}

    fn encoder(&mut self, spec: &ResolvedEncoder, encoder: &Encoder, input: &Matrix, output: &Matrix) {}

    fn fusion(&mut self, node: &ResolvedNode, kind: FusionKind, a: &Matrix, b: &Matrix, fused: &Matrix) {}

    fn objective(&mut self, node: &ResolvedNode, kind: ObjectiveKind) {}

    fn trainer(
        &mut self,
        node: &ResolvedNode,
        params: &TrainerParams,
        features: &Matrix,
        model: &SgdClassifier,
    ) {
    }

    fn evaluator(&mut self, node: &ResolvedNode, params: &EvaluatorParams, report: &MetricsReport) {}
}

/// Observer that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Block kinds resolved once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub graph: ResolvedGraph,
    pub encoders: [EncoderKind; 2],
    pub fusion: FusionKind,
    pub objective: Option<ObjectiveKind>,
    pub trainer: TrainerParams,
    pub evaluator: EvaluatorParams,
}

impl ExecutionPlan {
    pub fn from_graph(graph: ResolvedGraph) -> std::result::Result<Self, ComputationError> {
        let encoders = [
            EncoderKind::resolve(&graph.encoders[0].node.slug, &graph.encoders[0].node.config)?,
            EncoderKind::resolve(&graph.encoders[1].node.slug, &graph.encoders[1].node.config)?,
        ];
        let fusion = FusionKind::resolve(&graph.fusion.slug)?;
        let objective = graph
            .objective
            .as_ref()
            .map(|n| ObjectiveKind::resolve(&n.slug))
            .transpose()?;
        let trainer = TrainerParams::resolve(&graph.trainer.slug, &graph.trainer.config)?;
        let evaluator = EvaluatorParams::resolve(&graph.evaluator.slug, &graph.evaluator.config)?;
        Ok(Self {
            graph,
            encoders,
            fusion,
            objective,
            trainer,
            evaluator,
        })
    }
}

/// Runs resolved pipelines against the registered dataset loaders.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    loaders: DataLoaderRegistry,
}

impl ExecutionEngine {
    pub fn new(loaders: DataLoaderRegistry) -> Self {
        Self { loaders }
    }

    pub fn loaders(&self) -> &DataLoaderRegistry {
        &self.loaders
    }

    pub fn execute(&self, spec: &PipelineSpec) -> Result<MetricsReport> {
        self.execute_observed(spec, &mut NoopObserver)
    }

    pub fn execute_observed(
        &self,
        spec: &PipelineSpec,
        observer: &mut dyn ExecutionObserver,
    ) -> Result<MetricsReport> {
        let graph = resolve(spec)?;
        let plan = ExecutionPlan::from_graph(graph)?;
        Ok(self.run_plan(&plan, spec.run_config.seed, observer)?)
    }

    pub fn run_plan(
        &self,
        plan: &ExecutionPlan,
        seed: u64,
        observer: &mut dyn ExecutionObserver,
    ) -> std::result::Result<MetricsReport, ComputationError> {
        let graph = &plan.graph;

        let splits = self
            .loaders
            .load_splits(&graph.dataset.slug, seed, &graph.dataset.config)?;
        observer.dataset(&graph.dataset, &splits);

        let mut encoders = Vec::with_capacity(2);
        let mut train_embeds = Vec::with_capacity(2);
        let mut test_embeds = Vec::with_capacity(2);
        for (resolved, kind) in graph.encoders.iter().zip(&plan.encoders) {
            let x_train = splits.train.modality(&resolved.modality_key)?;
            let x_test = splits.test.modality(&resolved.modality_key)?;
            let encoder = kind.build(x_train.cols(), seed, resolved.salt);
            let z_train = encoder.encode(x_train)?;
            observer.encoder(resolved, &encoder, x_train, &z_train);
            test_embeds.push(encoder.encode(x_test)?);
            train_embeds.push(z_train);
            encoders.push(encoder);
        }

        let fused_train = plan.fusion.fuse(&train_embeds[0], &train_embeds[1])?;
        observer.fusion(
            &graph.fusion,
            plan.fusion,
            &train_embeds[0],
            &train_embeds[1],
            &fused_train,
        );
        let fused_test = plan.fusion.fuse(&test_embeds[0], &test_embeds[1])?;

        if let (Some(node), Some(kind)) = (&graph.objective, plan.objective) {
            observer.objective(node, kind);
        }

        let y_train = splits.train.require_labels("supervised training")?;
        let started = Instant::now();
        let model = SgdClassifier::fit(
            &fused_train,
            y_train,
            plan.trainer.alpha,
            plan.trainer.max_iter,
            seed,
        )?;
        let train_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(epochs = model.epochs_run(), train_time_ms, "classifier fitted");
        observer.trainer(&graph.trainer, &plan.trainer, &fused_train, &model);

        let y_test = splits.test.require_labels("evaluation")?;
        let accuracy = model.score(&fused_test, y_test)?;

        let noise_std = plan.evaluator.noise_std;
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(NOISE_SALT));
        let mut noisy_embeds = Vec::with_capacity(2);
        for (resolved, encoder) in graph.encoders.iter().zip(&encoders) {
            let x_test = splits.test.modality(&resolved.modality_key)?;
            let noise = Matrix::from_fn(x_test.rows(), x_test.cols(), |_, _| {
                noise_std * rng.sample::<f64, _>(StandardNormal)
            });
            noisy_embeds.push(encoder.encode(&x_test.add(&noise)?)?);
        }
        let fused_noisy = plan.fusion.fuse(&noisy_embeds[0], &noisy_embeds[1])?;
        let noisy_accuracy = model.score(&fused_noisy, y_test)?;

        let param_count =
            encoders.iter().map(Encoder::param_count).sum::<u64>() + model.param_count();

        let report = MetricsReport::new(
            accuracy,
            param_count,
            train_time_ms,
            noise_std,
            noisy_accuracy,
        );
        observer.evaluator(&graph.evaluator, &plan.evaluator, &report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{BenchError, ValidationError};
    use crate::domain::pipeline::fixtures;

    #[test]
    fn reference_pipeline_metrics() {
        let engine = ExecutionEngine::default();
        let report = engine.execute(&fixtures::spec()).unwrap();
        assert!((0.0..=1.0).contains(&report.performance.accuracy));
        assert_eq!(
            report.complexity.param_count,
            16 * 20 + 16 + 16 * 30 + 16 + (32 + 1)
        );
        assert_eq!(report.robustness.noise_std, 0.2);
    }

    #[test]
    fn unsupported_encoder_fails_before_loading() {
        let mut spec = fixtures::spec();
        spec.graph.nodes[1].block_ref.block_id = "unimodals.mystery".to_string();
        let err = ExecutionEngine::default().execute(&spec).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Computation(ComputationError::UnsupportedBlock { .. })
        ));
    }

    #[test]
    fn incomplete_graph_is_a_validation_error() {
        let mut spec = fixtures::spec();
        spec.graph.nodes.retain(|n| n.id != "fuse");
        let err = ExecutionEngine::default().execute(&spec).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Validation(ValidationError::IncompletePipeline { .. })
        ));
    }

    #[test]
    fn unknown_modality_fails() {
        let mut spec = fixtures::spec();
        spec.graph.nodes[2]
            .config
            .insert("modalityKey".to_string(), serde_json::json!("text"));
        let err = ExecutionEngine::default().execute(&spec).unwrap_err();
        assert!(err.to_string().starts_with("Unknown modalityKey 'text'"));
    }
}
