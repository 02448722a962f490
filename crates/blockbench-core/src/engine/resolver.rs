//! Role-based graph resolution.
//!
//! Nodes are assigned by role, never by edge traversal or declaration order
//! of the other roles. Expected multiset: one dataset, at least two
//! encoders, one fusion, one trainer, one evaluator, optionally one
//! objective. With more than two encoders the first two declared are used.

use tracing::warn;

use crate::domain::error::ValidationError;
use crate::domain::pipeline::{Node, NodeRole, PipelineSpec};
use crate::engine::params::Config;

/// Default modality consumed by the encoder at each position.
pub const DEFAULT_MODALITY_KEYS: [&str; 2] = ["audio", "vision"];
/// Seed salt for the encoder at each position.
pub const ENCODER_SALTS: [u64; 2] = [101, 202];

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    pub node_id: String,
    pub role: NodeRole,
    pub slug: String,
    pub version: String,
    pub config: Config,
}

impl From<&Node> for ResolvedNode {
    fn from(node: &Node) -> Self {
        Self {
            node_id: node.id.clone(),
            role: node.role,
            slug: node.block_ref.block_id.clone(),
            version: node.block_ref.version.clone(),
            config: node.config.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEncoder {
    pub node: ResolvedNode,
    pub modality_key: String,
    pub salt: u64,
}

/// Canonical execution order of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGraph {
    pub dataset: ResolvedNode,
    pub encoders: [ResolvedEncoder; 2],
    pub fusion: ResolvedNode,
    pub objective: Option<ResolvedNode>,
    pub trainer: ResolvedNode,
    pub evaluator: ResolvedNode,
}

impl ResolvedGraph {
    /// Nodes in execution order.
    pub fn ordered_nodes(&self) -> Vec<&ResolvedNode> {
        let mut nodes = vec![&self.dataset, &self.encoders[0].node, &self.encoders[1].node, &self.fusion];
        if let Some(objective) = &self.objective {
            nodes.push(objective);
        }
        nodes.push(&self.trainer);
        nodes.push(&self.evaluator);
        nodes
    }
}

fn nodes_with(spec: &PipelineSpec, role: NodeRole) -> Vec<&Node> {
    spec.graph.nodes.iter().filter(|n| n.role == role).collect()
}

fn exactly_one(spec: &PipelineSpec, role: NodeRole) -> Result<ResolvedNode, ValidationError> {
    match nodes_with(spec, role).as_slice() {
        [] => Err(ValidationError::IncompletePipeline {
            role: role.to_string(),
            expected: "exactly 1".to_string(),
        }),
        [node] => Ok(ResolvedNode::from(*node)),
        many => Err(ValidationError::InvalidField {
            field: "graph.nodes".to_string(),
            reason: format!("expected exactly 1 {role} node, found {}", many.len()),
        }),
    }
}

fn encoder_at(node: &Node, position: usize) -> ResolvedEncoder {
    let modality_key = node
        .config
        .get("modalityKey")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_MODALITY_KEYS[position])
        .to_string();
    ResolvedEncoder {
        node: ResolvedNode::from(node),
        modality_key,
        salt: ENCODER_SALTS[position],
    }
}

/// Resolve a spec's graph into its role assignment.
pub fn resolve(spec: &PipelineSpec) -> Result<ResolvedGraph, ValidationError> {
    let dataset = exactly_one(spec, NodeRole::Dataset)?;

    let encoders = nodes_with(spec, NodeRole::Encoder);
    if encoders.len() < 2 {
        return Err(ValidationError::IncompletePipeline {
            role: NodeRole::Encoder.to_string(),
            expected: format!("at least 2, found {}", encoders.len()),
        });
    }
    if encoders.len() > 2 {
        let ignored: Vec<&str> = encoders[2..].iter().map(|n| n.id.as_str()).collect();
        warn!(?ignored, "more than two encoder nodes; using the first two declared");
    }

    let fusion = exactly_one(spec, NodeRole::Fusion)?;
    let trainer = exactly_one(spec, NodeRole::Trainer)?;
    let evaluator = exactly_one(spec, NodeRole::Evaluator)?;

    let objective = match nodes_with(spec, NodeRole::Objective).as_slice() {
        [] => None,
        [node] => Some(ResolvedNode::from(*node)),
        many => {
            return Err(ValidationError::InvalidField {
                field: "graph.nodes".to_string(),
                reason: format!("expected at most 1 objective node, found {}", many.len()),
            })
        }
    };

    Ok(ResolvedGraph {
        dataset,
        encoders: [encoder_at(encoders[0], 0), encoder_at(encoders[1], 1)],
        fusion,
        objective,
        trainer,
        evaluator,
    })
}
