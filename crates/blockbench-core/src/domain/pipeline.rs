//! Pipeline spec: the client-declared graph, lock claims and run config.
//!
//! Wire format is camelCase JSON. Structural checks live in
//! [`PipelineSpec::validate_structure`]; registry checks live in the locker.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, ValidationError};

pub const SPEC_VERSION: &str = "0.1.0";

fn default_spec_version() -> String {
    SPEC_VERSION.to_string()
}

/// A declared pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    #[serde(default)]
    pub pipeline: PipelineMeta,
    pub graph: Graph,
    #[serde(default)]
    pub locked_blocks: Vec<LockedBlockClaim>,
    #[serde(default)]
    pub run_config: RunConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Role a node plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Dataset,
    Encoder,
    Fusion,
    Objective,
    Trainer,
    Evaluator,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Dataset => "dataset",
            NodeRole::Encoder => "encoder",
            NodeRole::Fusion => "fusion",
            NodeRole::Objective => "objective",
            NodeRole::Trainer => "trainer",
            NodeRole::Evaluator => "evaluator",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference from a node to a block version. `block_id` is the block slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    pub block_id: String,
    pub version: String,
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.block_id, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDecl {
    pub name: String,
    pub port_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub role: NodeRole,
    pub block_ref: BlockRef,
    #[serde(default)]
    pub inputs: Vec<PortDecl>,
    #[serde(default)]
    pub outputs: Vec<PortDecl>,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Editor layout. Carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeEndpoint {
    pub node_id: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub from: EdgeEndpoint,
    pub to: EdgeEndpoint,
}

/// A client's claim to use one specific block version.
///
/// Only `block_id`, `version` and `digest` matter; the optional schema copies
/// are accepted for round-tripping but never used for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedBlockClaim {
    pub block_id: String,
    pub version: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Sync,
    Async,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Sync => "sync",
            RunMode::Async => "async",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    #[serde(default, rename = "memoryMB", skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<RunResources>,
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field: field.into(),
        reason: reason.into(),
    }
}

impl PipelineSpec {
    /// Parse a spec from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Shape checks that need no registry access.
    pub fn validate_structure(&self) -> std::result::Result<(), ValidationError> {
        if self.spec_version != SPEC_VERSION {
            return Err(invalid(
                "specVersion",
                format!("unsupported version {}, expected {SPEC_VERSION}", self.spec_version),
            ));
        }
        if self.graph.nodes.is_empty() {
            return Err(invalid("graph.nodes", "must not be empty"));
        }

        let mut ids = HashSet::new();
        for (i, node) in self.graph.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(invalid(format!("graph.nodes[{i}].id"), "must not be empty"));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNode(node.id.clone()));
            }
            if node.block_ref.block_id.trim().is_empty() {
                return Err(invalid(
                    format!("graph.nodes[{i}].blockRef.blockId"),
                    "must not be empty",
                ));
            }
            if node.block_ref.version.trim().is_empty() {
                return Err(invalid(
                    format!("graph.nodes[{i}].blockRef.version"),
                    "must not be empty",
                ));
            }
        }

        for edge in &self.graph.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint.node_id.as_str()) {
                    return Err(ValidationError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.node_id.clone(),
                    });
                }
            }
        }

        for (i, claim) in self.locked_blocks.iter().enumerate() {
            if claim.block_id.trim().is_empty() {
                return Err(invalid(format!("lockedBlocks[{i}].blockId"), "must not be empty"));
            }
            if claim.digest.trim().is_empty() {
                return Err(invalid(format!("lockedBlocks[{i}].digest"), "must not be empty"));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_camel_case_wire_format() {
        let spec = fixtures::spec();
        assert_eq!(spec.spec_version, "0.1.0");
        assert_eq!(spec.graph.nodes.len(), 6);
        assert_eq!(spec.graph.nodes[1].role, NodeRole::Encoder);
        assert_eq!(spec.graph.nodes[1].block_ref.block_id, "unimodals.linear");
        assert_eq!(spec.graph.edges[0].from.node_id, "ds");
        assert_eq!(spec.run_config.seed, 7);
        assert_eq!(spec.run_config.mode, RunMode::Sync);

        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["graph"]["nodes"][0]["type"], "dataset");
        assert_eq!(back["runConfig"]["mode"], "sync");
    }

    #[test]
    fn negative_seed_is_rejected() {
        let mut raw = fixtures::spec_json();
        raw["runConfig"]["seed"] = json!(-1);
        assert!(serde_json::from_value::<PipelineSpec>(raw).is_err());
    }

    #[test]
    fn resources_use_memory_mb_key() {
        let cfg: RunConfig = serde_json::from_value(json!({
            "seed": 1, "mode": "async", "resources": {"cpuLimit": 1.5, "memoryMB": 512}
        }))
        .unwrap();
        let res = cfg.resources.unwrap();
        assert_eq!(res.memory_mb, Some(512));
        assert_eq!(res.cpu_limit, Some(1.5));
        assert_eq!(cfg.mode, RunMode::Async);
    }

    #[test]
    fn structure_checks() {
        assert!(fixtures::spec().validate_structure().is_ok());

        let mut dup = fixtures::spec();
        dup.graph.nodes[2].id = "encA".to_string();
        assert_eq!(
            dup.validate_structure(),
            Err(ValidationError::DuplicateNode("encA".to_string()))
        );

        let mut dangling = fixtures::spec();
        dangling.graph.edges[0].to.node_id = "ghost".to_string();
        assert!(matches!(
            dangling.validate_structure(),
            Err(ValidationError::DanglingEdge { .. })
        ));

        let mut wrong_version = fixtures::spec();
        wrong_version.spec_version = "9.9.9".to_string();
        assert!(matches!(
            wrong_version.validate_structure(),
            Err(ValidationError::InvalidField { .. })
        ));
    }
}
