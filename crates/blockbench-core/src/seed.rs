//! Built-in block catalog.
//!
//! Seeding is idempotent: blocks are upserted by slug and versions that
//! already exist are left untouched, so re-running never changes a digest.

use blockbench_state::BlockCategory;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::access::Caller;
use crate::domain::error::Result;
use crate::engine::blocks::{
    BASIC_EVALUATOR, CONCAT_FUSION, CROSS_ENTROPY_OBJECTIVE, IDENTITY_ENCODER, LINEAR_ENCODER,
    SGD_TRAINER, SUM_FUSION,
};
use crate::engine::dataset::TOY_AV_SLUG;
use crate::registry::{BlockRegistry, VersionDraft};

struct SeedBlock {
    slug: &'static str,
    category: BlockCategory,
    display_name: &'static str,
    description: &'static str,
    versions: Vec<SeedVersion>,
}

struct SeedVersion {
    version: &'static str,
    input_schema: Value,
    output_schema: Value,
    changelog: &'static str,
}

fn v(version: &'static str, input_schema: Value, output_schema: Value, changelog: &'static str) -> SeedVersion {
    SeedVersion {
        version,
        input_schema,
        output_schema,
        changelog,
    }
}

fn modality_key() -> Value {
    json!({"type": "string", "minLength": 1, "description": "Which modality to read from batch.modalities"})
}

fn embed_output() -> Value {
    json!({"type": "object", "properties": {"embed": {"type": "array"}}, "required": ["embed"]})
}

fn fused_output() -> Value {
    json!({"type": "object", "properties": {"fused": {"type": "array"}}, "required": ["fused"]})
}

fn closed_empty() -> Value {
    json!({"type": "object", "properties": {}, "additionalProperties": false})
}

fn catalog() -> Vec<SeedBlock> {
    vec![
        SeedBlock {
            slug: TOY_AV_SLUG,
            category: BlockCategory::Dataset,
            display_name: "Toy AV Dataset",
            description: "Deterministic synthetic audio+vision toy dataset.",
            versions: vec![
                v(
                    "1.0.0",
                    json!({
                        "type": "object",
                        "properties": {"n": {"type": "integer", "minimum": 100}},
                        "additionalProperties": true
                    }),
                    json!({
                        "type": "object",
                        "properties": {
                            "audio": {"type": "array"},
                            "vision": {"type": "array"},
                            "labels": {"type": "array"}
                        },
                        "required": ["audio", "vision", "labels"]
                    }),
                    "Initial published toy dataset block.",
                ),
                v(
                    "1.1.0",
                    json!({
                        "type": "object",
                        "properties": {
                            "n": {"type": "integer", "minimum": 100},
                            "audioDim": {"type": "integer", "minimum": 2, "default": 20},
                            "visionDim": {"type": "integer", "minimum": 2, "default": 30},
                            "trainRatio": {"type": "number", "minimum": 0.5, "maximum": 0.95, "default": 0.8}
                        },
                        "additionalProperties": true
                    }),
                    json!({
                        "type": "object",
                        "properties": {
                            "batch": {
                                "type": "object",
                                "description": "Standardized batch.multimodal.v1 contract.",
                                "properties": {
                                    "modalities": {"type": "object"},
                                    "labels": {"type": "array"},
                                    "meta": {"type": "object"}
                                },
                                "required": ["modalities"]
                            },
                            "labels": {"type": "array"}
                        },
                        "required": ["batch", "labels"]
                    }),
                    "Add standardized batch.multimodal.v1 output contract for unified data loading.",
                ),
            ],
        },
        SeedBlock {
            slug: IDENTITY_ENCODER,
            category: BlockCategory::UnimodalEncoder,
            display_name: "Identity Encoder",
            description: "Pass-through encoder.",
            versions: vec![
                v(
                    "1.0.0",
                    json!({
                        "type": "object",
                        "properties": {"scale": {"type": "number"}},
                        "additionalProperties": false
                    }),
                    embed_output(),
                    "Initial published identity encoder.",
                ),
                v(
                    "1.1.0",
                    json!({
                        "type": "object",
                        "properties": {
                            "scale": {"type": "number", "default": 1.0},
                            "modalityKey": modality_key()
                        },
                        "required": ["modalityKey"],
                        "additionalProperties": false
                    }),
                    embed_output(),
                    "Add modalityKey to support unified batch input.",
                ),
            ],
        },
        SeedBlock {
            slug: LINEAR_ENCODER,
            category: BlockCategory::UnimodalEncoder,
            display_name: "Linear Encoder",
            description: "Simple deterministic linear projection encoder (seeded).",
            versions: vec![
                v(
                    "1.0.0",
                    json!({
                        "type": "object",
                        "properties": {"outDim": {"type": "integer", "minimum": 2}},
                        "required": ["outDim"],
                        "additionalProperties": false
                    }),
                    embed_output(),
                    "Initial published linear encoder.",
                ),
                v(
                    "1.1.0",
                    json!({
                        "type": "object",
                        "properties": {
                            "outDim": {"type": "integer", "minimum": 2},
                            "modalityKey": modality_key()
                        },
                        "required": ["outDim", "modalityKey"],
                        "additionalProperties": false
                    }),
                    embed_output(),
                    "Add modalityKey to support unified batch input.",
                ),
            ],
        },
        SeedBlock {
            slug: CONCAT_FUSION,
            category: BlockCategory::Fusion,
            display_name: "Concat Fusion",
            description: "Concatenate embeddings.",
            versions: vec![v("1.0.0", closed_empty(), fused_output(), "Initial published concat fusion.")],
        },
        SeedBlock {
            slug: SUM_FUSION,
            category: BlockCategory::Fusion,
            display_name: "Sum Fusion",
            description: "Element-wise sum embeddings (same dim).",
            versions: vec![v("1.0.0", closed_empty(), fused_output(), "Initial published sum fusion.")],
        },
        SeedBlock {
            slug: CROSS_ENTROPY_OBJECTIVE,
            category: BlockCategory::Objective,
            display_name: "Cross Entropy",
            description: "Classification cross entropy objective.",
            versions: vec![v(
                "1.0.0",
                closed_empty(),
                closed_empty(),
                "Initial published objective placeholder.",
            )],
        },
        SeedBlock {
            slug: SGD_TRAINER,
            category: BlockCategory::TrainingStructure,
            display_name: "SGD Trainer",
            description: "Train a linear classifier with SGD.",
            versions: vec![v(
                "1.0.0",
                json!({
                    "type": "object",
                    "properties": {
                        "maxIter": {"type": "integer", "minimum": 10},
                        "alpha": {"type": "number", "minimum": 0}
                    },
                    "additionalProperties": false
                }),
                json!({"type": "object", "properties": {"model": {"type": "string"}}, "required": ["model"]}),
                "Initial published trainer block.",
            )],
        },
        SeedBlock {
            slug: BASIC_EVALUATOR,
            category: BlockCategory::Evaluator,
            display_name: "Basic Evaluator",
            description: "Compute performance/complexity/robustness.",
            versions: vec![v(
                "1.0.0",
                json!({
                    "type": "object",
                    "properties": {"noiseStd": {"type": "number", "minimum": 0}},
                    "additionalProperties": false
                }),
                json!({"type": "object", "properties": {"metrics": {"type": "object"}}, "required": ["metrics"]}),
                "Initial published evaluator block.",
            )],
        },
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub blocks: usize,
    pub versions_created: usize,
    pub versions_existing: usize,
}

/// Register the built-in catalog with every version published.
pub async fn seed_registry(registry: &BlockRegistry) -> Result<SeedReport> {
    let caller = Caller::system();
    let mut report = SeedReport::default();

    for block in catalog() {
        registry
            .register_or_update_block(
                &caller,
                block.slug,
                block.category,
                block.display_name,
                block.description,
            )
            .await?;
        report.blocks += 1;

        for seed in block.versions {
            if registry.find_version(block.slug, seed.version).await?.is_some() {
                report.versions_existing += 1;
                continue;
            }
            let draft = VersionDraft::new(seed.version, seed.input_schema, seed.output_schema)
                .with_changelog(seed.changelog);
            registry.publish_version(&caller, block.slug, draft).await?;
            report.versions_created += 1;
        }
    }

    info!(
        blocks = report.blocks,
        created = report.versions_created,
        existing = report.versions_existing,
        "registry seeded"
    );
    Ok(report)
}
