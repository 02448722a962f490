//! Pipeline validator / locker.
//!
//! Verifies a spec's lock claims against the registry and produces the
//! manifest that execution and run records use. Client-supplied schemas are
//! never copied into the manifest.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::domain::digest::verify_block_digest;
use crate::domain::error::{IntegrityError, Result, ValidationError};
use crate::domain::manifest::{LockedBlock, LockedBlockManifest};
use crate::domain::pipeline::{LockedBlockClaim, PipelineSpec};
use crate::domain::schema_check::check_config;
use crate::engine::resolver::{resolve, ResolvedGraph};
use crate::obs::emit_pipeline_locked;
use crate::registry::BlockRegistry;

/// A spec that passed every pre-execution check, with its manifest.
#[derive(Debug, Clone)]
pub struct LockedPipeline {
    pub spec: PipelineSpec,
    pub manifest: LockedBlockManifest,
    pub graph: ResolvedGraph,
}

#[derive(Clone)]
pub struct PipelineLocker {
    registry: BlockRegistry,
}

impl PipelineLocker {
    pub fn new(registry: BlockRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Verify every lock claim and return the registry-sourced manifest.
    ///
    /// Claims are checked in declaration order; the first failure wins.
    #[instrument(skip(self, spec), fields(pipeline = %spec.pipeline.id, claims = spec.locked_blocks.len()))]
    pub async fn lock_manifest(&self, spec: &PipelineSpec) -> Result<LockedBlockManifest> {
        let mut manifest = LockedBlockManifest::default();
        let mut seen = HashSet::new();

        for claim in &spec.locked_blocks {
            let slug = claim.block_id.as_str();
            let version = claim.version.as_str();

            if self.registry.find_block(slug).await?.is_none() {
                return Err(IntegrityError::UnknownBlock {
                    slug: slug.to_string(),
                }
                .into());
            }
            let record = self
                .registry
                .find_version(slug, version)
                .await?
                .ok_or_else(|| IntegrityError::UnknownBlockVersion {
                    slug: slug.to_string(),
                    version: version.to_string(),
                })?;

            verify_block_digest(slug, version, &record.digest, &claim.digest)?;

            if !record.status.is_executable() {
                return Err(IntegrityError::BlockNotPublished {
                    slug: slug.to_string(),
                    version: version.to_string(),
                    status: record.status.to_string(),
                }
                .into());
            }

            if seen.insert((slug.to_string(), version.to_string())) {
                manifest
                    .locked_blocks
                    .push(LockedBlock::from_record(slug, &record));
            } else {
                debug!(%slug, %version, "duplicate lock claim collapsed");
            }
        }
        Ok(manifest)
    }

    /// Full pre-execution check: structure, lock claims, node coverage,
    /// role assignment and node configs against the locked input schemas.
    #[instrument(skip(self, spec), fields(pipeline = %spec.pipeline.id))]
    pub async fn lock(&self, spec: &PipelineSpec) -> Result<LockedPipeline> {
        spec.validate_structure()?;
        let manifest = self.lock_manifest(spec).await?;

        for node in &spec.graph.nodes {
            let locked = manifest
                .get(&node.block_ref.block_id, &node.block_ref.version)
                .ok_or_else(|| ValidationError::UnlockedNode {
                    node_id: node.id.clone(),
                    slug: node.block_ref.block_id.clone(),
                    version: node.block_ref.version.clone(),
                })?;
            check_config(
                &node.id,
                &locked.input_schema,
                &serde_json::Value::Object(node.config.clone()),
            )?;
        }

        let graph = resolve(spec)?;
        emit_pipeline_locked(&spec.pipeline.id, manifest.len());
        Ok(LockedPipeline {
            spec: spec.clone(),
            manifest,
            graph,
        })
    }

    /// Fill `lockedBlocks` with the registry's current digests for every
    /// node reference. Authoring helper; the result still has to pass
    /// [`PipelineLocker::lock`].
    pub async fn pin(&self, spec: &PipelineSpec) -> Result<PipelineSpec> {
        let mut pinned = spec.clone();
        pinned.locked_blocks.clear();
        let mut seen = HashSet::new();
        for node in &spec.graph.nodes {
            let slug = &node.block_ref.block_id;
            let version = &node.block_ref.version;
            if !seen.insert((slug.clone(), version.clone())) {
                continue;
            }
            let record = self
                .registry
                .find_version(slug, version)
                .await?
                .ok_or_else(|| IntegrityError::UnknownBlockVersion {
                    slug: slug.clone(),
                    version: version.clone(),
                })?;
            pinned.locked_blocks.push(LockedBlockClaim {
                block_id: slug.clone(),
                version: version.clone(),
                digest: record.digest,
                input_schema: None,
                output_schema: None,
                changelog: None,
                deprecated: None,
            });
        }
        Ok(pinned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Caller;
    use crate::domain::error::BenchError;
    use crate::domain::pipeline::fixtures;
    use crate::registry::VersionDraft;
    use crate::seed::seed_registry;
    use blockbench_state::fakes::MemoryBlockStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn locker() -> PipelineLocker {
        let registry = BlockRegistry::new(Arc::new(MemoryBlockStore::new()));
        seed_registry(&registry).await.unwrap();
        PipelineLocker::new(registry)
    }

    #[tokio::test]
    async fn pinned_fixture_locks() {
        let locker = locker().await;
        let spec = locker.pin(&fixtures::spec()).await.unwrap();
        assert_eq!(spec.locked_blocks.len(), 5);

        let locked = locker.lock(&spec).await.unwrap();
        assert_eq!(locked.manifest.len(), 5);
        assert_eq!(locked.graph.encoders[1].modality_key, "vision");
    }

    #[tokio::test]
    async fn forged_digest_is_rejected_with_both_values() {
        let locker = locker().await;
        let mut spec = locker.pin(&fixtures::spec()).await.unwrap();
        let real = spec.locked_blocks[2].digest.clone();
        spec.locked_blocks[2].digest = "0000000000000000".to_string();

        match locker.lock(&spec).await.unwrap_err() {
            BenchError::Integrity(IntegrityError::DigestMismatch { expected, actual, .. }) => {
                assert_eq!(expected, real);
                assert_eq!(actual, "0000000000000000");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn claimed_schemas_are_ignored() {
        let locker = locker().await;
        let mut spec = locker.pin(&fixtures::spec()).await.unwrap();
        spec.locked_blocks[1].input_schema = Some(json!({"type": "string"}));

        let manifest = locker.lock_manifest(&spec).await.unwrap();
        let linear = manifest.get("unimodals.linear", "1.1.0").unwrap();
        assert_eq!(linear.input_schema["required"], json!(["outDim", "modalityKey"]));
    }

    #[tokio::test]
    async fn draft_version_is_not_lockable() {
        let locker = locker().await;
        let draft = locker
            .registry()
            .create_draft_version(
                &Caller::system(),
                "fusions.concat",
                VersionDraft::new("1.1.0", json!({}), json!({})),
            )
            .await
            .unwrap();

        let mut spec = locker.pin(&fixtures::spec()).await.unwrap();
        let claim = spec
            .locked_blocks
            .iter_mut()
            .find(|c| c.block_id == "fusions.concat")
            .unwrap();
        claim.version = "1.1.0".to_string();
        claim.digest = draft.digest;

        let err = locker.lock_manifest(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            BenchError::Integrity(IntegrityError::BlockNotPublished { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_block_and_version() {
        let locker = locker().await;
        let mut spec = locker.pin(&fixtures::spec()).await.unwrap();
        spec.locked_blocks[0].version = "9.9.9".to_string();
        assert!(matches!(
            locker.lock_manifest(&spec).await.unwrap_err(),
            BenchError::Integrity(IntegrityError::UnknownBlockVersion { .. })
        ));

        spec.locked_blocks[0].block_id = "datasets.missing".to_string();
        assert!(matches!(
            locker.lock_manifest(&spec).await.unwrap_err(),
            BenchError::Integrity(IntegrityError::UnknownBlock { .. })
        ));
    }

    #[tokio::test]
    async fn unlocked_node_and_bad_config() {
        let locker = locker().await;
        let mut spec = locker.pin(&fixtures::spec()).await.unwrap();
        spec.locked_blocks.retain(|c| c.block_id != "eval_scripts.basic");
        assert!(matches!(
            locker.lock(&spec).await.unwrap_err(),
            BenchError::Validation(ValidationError::UnlockedNode { .. })
        ));

        let mut spec = locker.pin(&fixtures::spec()).await.unwrap();
        spec.graph.nodes[1]
            .config
            .insert("outDim".to_string(), json!(1));
        match locker.lock(&spec).await.unwrap_err() {
            BenchError::Validation(ValidationError::InvalidConfig { node_id, field, .. }) => {
                assert_eq!(node_id, "encA");
                assert_eq!(field, "outDim");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_encoder_is_incomplete() {
        let locker = locker().await;
        let mut spec = fixtures::spec();
        spec.graph.nodes.retain(|n| n.id != "encV");
        spec.graph.edges.retain(|e| e.to.node_id != "encV");
        let spec = locker.pin(&spec).await.unwrap();
        assert!(matches!(
            locker.lock(&spec).await.unwrap_err(),
            BenchError::Validation(ValidationError::IncompletePipeline { .. })
        ));
    }
}
