//! Step-by-step execution traces.
//!
//! [`TraceRecorder`] is an [`ExecutionObserver`]: it rides along the same
//! engine pass that computes the metrics, so a trace can never disagree with
//! the numbers it explains.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::Result;
use crate::domain::pipeline::PipelineSpec;
use crate::domain::run::{MetricsReport, BATCH_CONTRACT};
use crate::engine::blocks::{Encoder, EvaluatorParams, FusionKind, ObjectiveKind, TrainerParams};
use crate::engine::classifier::SgdClassifier;
use crate::engine::dataset::Splits;
use crate::engine::executor::{ExecutionEngine, ExecutionObserver};
use crate::engine::matrix::Matrix;
use crate::engine::resolver::{ResolvedEncoder, ResolvedNode};

pub const TRACE_VERSION: &str = "0.1.0";
pub const PREVIEW_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePort {
    pub name: String,
    pub port_type: String,
    pub shape: Option<Vec<usize>>,
    pub preview: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TracePort {
    fn opaque(name: &str, port_type: &str) -> Self {
        Self {
            name: name.to_string(),
            port_type: port_type.to_string(),
            shape: None,
            preview: None,
            note: None,
        }
    }

    fn matrix(name: &str, port_type: &str, m: &Matrix) -> Self {
        Self {
            name: name.to_string(),
            port_type: port_type.to_string(),
            shape: Some(m.shape().to_vec()),
            preview: Some(m.preview(PREVIEW_LEN)),
            note: None,
        }
    }

    fn labels(labels: &[i64]) -> Self {
        Self {
            name: "labels".to_string(),
            port_type: "labels.class".to_string(),
            shape: Some(vec![labels.len()]),
            preview: Some(labels.iter().take(PREVIEW_LEN).map(|&l| l as f64).collect()),
            note: None,
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub node_id: String,
    pub node_type: String,
    pub block_id: String,
    pub version: String,
    pub title: String,
    pub config: Value,
    pub inputs: Vec<TracePort>,
    pub outputs: Vec<TracePort>,
    pub formula: String,
    pub rationale: String,
    #[serde(rename = "impl")]
    pub implementation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainTrace {
    pub trace_version: String,
    pub metrics: MetricsReport,
    pub steps: Vec<TraceStep>,
}

/// Collects one [`TraceStep`] per executed node.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    steps: Vec<TraceStep>,
    labels: Option<TracePort>,
    encoder_count: usize,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_steps(self) -> Vec<TraceStep> {
        self.steps
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        node: &ResolvedNode,
        title: String,
        inputs: Vec<TracePort>,
        outputs: Vec<TracePort>,
        formula: &str,
        rationale: &str,
        implementation: &[&str],
    ) {
        self.steps.push(TraceStep {
            node_id: node.node_id.clone(),
            node_type: node.role.to_string(),
            block_id: node.slug.clone(),
            version: node.version.clone(),
            title,
            config: Value::Object(node.config.clone()),
            inputs,
            outputs,
            formula: formula.to_string(),
            rationale: rationale.to_string(),
            implementation: implementation.iter().map(|s| s.to_string()).collect(),
        });
    }
}

impl ExecutionObserver for TraceRecorder {
    fn dataset(&mut self, node: &ResolvedNode, splits: &Splits) {
        let keys: Vec<&String> = splits.train.modalities.keys().collect();
        let mut outputs = vec![TracePort::opaque("batch.modalities", BATCH_CONTRACT)
            .with_note(format!("keys={keys:?}"))];
        if let Some(labels) = splits.train.labels.as_deref() {
            let port = TracePort::labels(labels);
            self.labels = Some(port.clone());
            outputs.push(port);
        }
        self.push(
            node,
            "Dataset -> unified batch".to_string(),
            Vec::new(),
            outputs,
            "raw dataset -> standardized batch.multimodal.v1",
            "A single batch contract keeps downstream blocks independent of how each dataset aligns its modalities.",
            &["blockbench_core::engine::dataset::DataLoaderRegistry::load_splits"],
        );
    }

    fn encoder(&mut self, spec: &ResolvedEncoder, encoder: &Encoder, input: &Matrix, output: &Matrix) {
        let (letter, embed, rationale) = if self.encoder_count == 0 {
            ("A", "embedA", "Projects the first modality into an embedding space that fusion can combine.")
        } else {
            ("V", "embedV", "Each modality is encoded on its own before the two are fused.")
        };
        self.encoder_count += 1;
        self.push(
            &spec.node,
            format!("Encoder {letter} ({})", spec.modality_key),
            vec![TracePort::matrix("batch", BATCH_CONTRACT, input)
                .with_note(format!("modalityKey={}", spec.modality_key))],
            vec![TracePort::matrix(embed, "tensor.embed", output)],
            encoder.formula(),
            rationale,
            &["blockbench_core::engine::blocks::Encoder::encode"],
        );
    }

    fn fusion(&mut self, node: &ResolvedNode, kind: FusionKind, a: &Matrix, b: &Matrix, fused: &Matrix) {
        self.push(
            node,
            "Fusion".to_string(),
            vec![
                TracePort::matrix("embedA", "tensor.embed", a),
                TracePort::matrix("embedV", "tensor.embed", b),
            ],
            vec![TracePort::matrix("fused", "tensor.fused", fused)],
            kind.formula(),
            "Fusion turns two modality embeddings into one feature path for the trainer.",
            &["blockbench_core::engine::blocks::FusionKind::fuse"],
        );
    }

    fn objective(&mut self, node: &ResolvedNode, kind: ObjectiveKind) {
        let ObjectiveKind::CrossEntropy = kind;
        self.push(
            node,
            "Objective".to_string(),
            Vec::new(),
            vec![TracePort::opaque("loss", "objective.loss").with_note("log-loss")],
            "loss = -log p(y | x)",
            "The trainer minimises cross-entropy; this node records that choice.",
            &["blockbench_core::engine::classifier"],
        );
    }

    fn trainer(
        &mut self,
        node: &ResolvedNode,
        params: &TrainerParams,
        features: &Matrix,
        model: &SgdClassifier,
    ) {
        let mut inputs = vec![TracePort::matrix("fused", "tensor.fused", features)];
        if let Some(labels) = &self.labels {
            inputs.push(labels.clone());
        }
        self.push(
            node,
            "Trainer".to_string(),
            inputs,
            vec![TracePort::opaque("model", "model.classifier").with_note(format!(
                "SgdClassifier(alpha={}, maxIter={}, epochs={}, params={})",
                params.alpha,
                params.max_iter,
                model.epochs_run(),
                model.param_count()
            ))],
            "optimize log-loss with SGD",
            "Supervised labels fit a linear map from fused features to classes.",
            &["blockbench_core::engine::classifier::SgdClassifier::fit"],
        );
    }

    fn evaluator(&mut self, node: &ResolvedNode, params: &EvaluatorParams, report: &MetricsReport) {
        self.push(
            node,
            "Evaluator".to_string(),
            vec![TracePort::opaque("model", "model.classifier")],
            vec![TracePort::opaque("metrics", "metrics.report").with_note(format!(
                "accuracy={:.4} noisyAccuracy={:.4} noiseStd={}",
                report.performance.accuracy, report.robustness.noisy_accuracy, params.noise_std
            ))],
            "compute performance / complexity / robustness",
            "One model is scored on accuracy, size and noise tolerance rather than accuracy alone.",
            &["blockbench_core::engine::executor::ExecutionEngine::run_plan"],
        );
    }
}

/// Execute `spec` and record its trace. The spec must already be locked.
pub fn trace_pipeline(engine: &ExecutionEngine, spec: &PipelineSpec) -> Result<ExplainTrace> {
    let mut recorder = TraceRecorder::new();
    let metrics = engine.execute_observed(spec, &mut recorder)?;
    Ok(ExplainTrace {
        trace_version: TRACE_VERSION.to_string(),
        metrics,
        steps: recorder.into_steps(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::fixtures;

    #[test]
    fn trace_matches_execution() {
        let engine = ExecutionEngine::default();
        let spec = fixtures::spec();
        let trace = trace_pipeline(&engine, &spec).unwrap();
        let plain = engine.execute(&spec).unwrap();

        assert_eq!(trace.trace_version, "0.1.0");
        assert_eq!(trace.metrics.performance, plain.performance);
        assert_eq!(trace.metrics.robustness, plain.robustness);

        let titles: Vec<&str> = trace.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "Dataset -> unified batch",
                "Encoder A (audio)",
                "Encoder V (vision)",
                "Fusion",
                "Trainer",
                "Evaluator"
            ]
        );
    }

    #[test]
    fn ports_carry_shapes_and_short_previews() {
        let trace = trace_pipeline(&ExecutionEngine::default(), &fixtures::spec()).unwrap();
        let fusion = &trace.steps[3];
        assert_eq!(fusion.outputs[0].shape, Some(vec![640, 32]));
        assert_eq!(fusion.outputs[0].preview.as_ref().map(Vec::len), Some(PREVIEW_LEN));
        assert_eq!(trace.steps[1].inputs[0].shape, Some(vec![640, 20]));

        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value["traceVersion"], "0.1.0");
        assert_eq!(value["steps"][0]["nodeType"], "dataset");
        assert!(value["steps"][1]["impl"].is_array());
        assert_eq!(value["steps"][4]["inputs"][1]["portType"], "labels.class");
    }
}
