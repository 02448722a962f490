//! Block registry service.
//!
//! Owns block identity, version creation and the version state machine.
//! Every mutating call takes a [`Caller`] and requires privilege.

use std::sync::Arc;

use blockbench_state::{
    new_record_id, BlockCategory, BlockPermissions, BlockRecord, BlockStore, BlockTests,
    BlockVersionRecord, StorageError, VersionStatus,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::access::Caller;
use crate::domain::digest::compute_block_digest;
use crate::domain::error::{BenchError, Result, ValidationError};
use crate::domain::lifecycle::{apply_version_event, VersionEvent};
use crate::domain::version::compare_versions;
use crate::metrics::METRICS;
use crate::obs::emit_version_transitioned;

const SLUG_PATTERN: &str = r"^[a-z0-9][a-z0-9._-]*$";

/// Reject slugs outside `[a-z0-9._-]` or not starting alphanumeric.
pub fn validate_slug(slug: &str) -> std::result::Result<(), ValidationError> {
    match regex::Regex::new(SLUG_PATTERN) {
        Ok(re) if re.is_match(slug) => Ok(()),
        _ => Err(ValidationError::InvalidSlug(slug.to_string())),
    }
}

/// Contract for a new block version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDraft {
    pub version: String,
    #[serde(default = "empty_object")]
    pub input_schema: serde_json::Value,
    #[serde(default = "empty_object")]
    pub output_schema: serde_json::Value,
    #[serde(default)]
    pub changelog: String,
    #[serde(default)]
    pub permissions: BlockPermissions,
    #[serde(default)]
    pub tests: BlockTests,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl VersionDraft {
    pub fn new(version: &str, input_schema: serde_json::Value, output_schema: serde_json::Value) -> Self {
        Self {
            version: version.to_string(),
            input_schema,
            output_schema,
            changelog: String::new(),
            permissions: BlockPermissions::default(),
            tests: BlockTests::default(),
        }
    }

    pub fn with_changelog(mut self, changelog: &str) -> Self {
        self.changelog = changelog.to_string();
        self
    }
}

/// Latest published contract of a block, as shown in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedSummary {
    pub version: String,
    pub digest: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub changelog: String,
    pub deprecated: bool,
}

impl From<&BlockVersionRecord> for PublishedSummary {
    fn from(v: &BlockVersionRecord) -> Self {
        Self {
            version: v.version.clone(),
            digest: v.digest.clone(),
            input_schema: v.input_schema.clone(),
            output_schema: v.output_schema.clone(),
            changelog: v.changelog.clone(),
            deprecated: v.status == VersionStatus::Deprecated,
        }
    }
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    /// Block slug
    pub block_id: String,
    pub category: BlockCategory,
    pub display_name: String,
    pub description: String,
    pub latest_published: Option<PublishedSummary>,
}

/// Registry service over a [`BlockStore`].
#[derive(Clone)]
pub struct BlockRegistry {
    store: Arc<dyn BlockStore>,
}

impl BlockRegistry {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    /// Upsert a block by slug.
    ///
    /// Display metadata is refreshed in place. A different category for an
    /// existing slug is rejected.
    #[instrument(skip(self, caller, category, display_name, description), fields(category = %category))]
    pub async fn register_or_update_block(
        &self,
        caller: &Caller,
        slug: &str,
        category: BlockCategory,
        display_name: &str,
        description: &str,
    ) -> Result<BlockRecord> {
        caller.require_privileged("register block")?;
        validate_slug(slug)?;

        if let Some(existing) = self.store.get_block_by_slug(slug).await? {
            if existing.category != category {
                return Err(ValidationError::CategoryChange {
                    slug: slug.to_string(),
                    existing: existing.category.to_string(),
                    requested: category.to_string(),
                }
                .into());
            }
            if existing.display_name == display_name && existing.description == description {
                return Ok(existing);
            }
            debug!("refreshing display metadata");
            return Ok(self
                .store
                .update_block_display(slug, display_name, description)
                .await?);
        }

        let record = BlockRecord::new(slug, category, display_name, description);
        match self.store.insert_block(record).await {
            Ok(block) => {
                info!(block_id = %block.block_id, "block registered");
                Ok(block)
            }
            // lost a race with a concurrent registration; the winner's row stands
            Err(StorageError::DuplicateKey { .. }) => self.get_block(slug).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Create a version directly in `published` status. For administratively
    /// trusted blocks such as the seeded catalog.
    #[instrument(skip(self, caller, draft), fields(version = %draft.version))]
    pub async fn publish_version(
        &self,
        caller: &Caller,
        slug: &str,
        draft: VersionDraft,
    ) -> Result<BlockVersionRecord> {
        caller.require_privileged("publish version")?;
        self.insert_version(slug, draft, VersionStatus::Published).await
    }

    /// Create a contributor version in `draft` status.
    #[instrument(skip(self, caller, draft), fields(version = %draft.version))]
    pub async fn create_draft_version(
        &self,
        caller: &Caller,
        slug: &str,
        draft: VersionDraft,
    ) -> Result<BlockVersionRecord> {
        caller.require_privileged("create draft version")?;
        self.insert_version(slug, draft, VersionStatus::Draft).await
    }

    async fn insert_version(
        &self,
        slug: &str,
        draft: VersionDraft,
        status: VersionStatus,
    ) -> Result<BlockVersionRecord> {
        if draft.version.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "version".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        let block = self.get_block(slug).await?;

        let duplicate = || BenchError::DuplicateVersion {
            slug: slug.to_string(),
            version: draft.version.clone(),
        };
        if self
            .store
            .find_version(&block.block_id, &draft.version)
            .await?
            .is_some()
        {
            return Err(duplicate());
        }

        let digest =
            compute_block_digest(slug, &draft.version, &draft.input_schema, &draft.output_schema)?;
        let now = Utc::now();
        let record = BlockVersionRecord {
            version_id: new_record_id(),
            block_id: block.block_id,
            version: draft.version.clone(),
            status,
            digest,
            input_schema: draft.input_schema.clone(),
            output_schema: draft.output_schema.clone(),
            changelog: draft.changelog.clone(),
            permissions: draft.permissions.clone(),
            tests: draft.tests.clone(),
            created_at: now,
            published_at: (status == VersionStatus::Published).then_some(now),
        };

        match self.store.insert_version(record).await {
            Ok(v) => {
                info!(version_id = %v.version_id, digest = %v.digest, status = %v.status, "block version created");
                Ok(v)
            }
            Err(StorageError::DuplicateKey { .. }) => Err(duplicate()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_block(&self, slug: &str) -> Result<Option<BlockRecord>> {
        Ok(self.store.get_block_by_slug(slug).await?)
    }

    pub async fn get_block(&self, slug: &str) -> Result<BlockRecord> {
        self.find_block(slug)
            .await?
            .ok_or_else(|| BenchError::not_found("block", slug))
    }

    /// Catalog ordered by (category, slug) with each block's latest published version.
    pub async fn list_blocks(&self) -> Result<Vec<BlockSummary>> {
        let mut blocks = self.store.list_blocks().await?;
        blocks.sort_by(|a, b| {
            a.category
                .as_str()
                .cmp(b.category.as_str())
                .then_with(|| a.slug.cmp(&b.slug))
        });

        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            let latest = self.latest_of(&block.block_id).await?;
            out.push(BlockSummary {
                block_id: block.slug,
                category: block.category,
                display_name: block.display_name,
                description: block.description,
                latest_published: latest.as_ref().map(PublishedSummary::from),
            });
        }
        Ok(out)
    }

    /// All versions of a block, oldest first.
    pub async fn list_versions(&self, slug: &str) -> Result<Vec<BlockVersionRecord>> {
        let block = self.get_block(slug).await?;
        Ok(self.store.list_versions(&block.block_id, None).await?)
    }

    /// Versions in `published` status, ordered by version.
    pub async fn list_published(&self, slug: &str) -> Result<Vec<BlockVersionRecord>> {
        let block = self.get_block(slug).await?;
        let mut versions = self
            .store
            .list_versions(&block.block_id, Some(VersionStatus::Published))
            .await?;
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }

    /// Greatest published version. Deprecated versions are not candidates.
    pub async fn latest_published(&self, slug: &str) -> Result<Option<BlockVersionRecord>> {
        let block = self.get_block(slug).await?;
        self.latest_of(&block.block_id).await
    }

    async fn latest_of(&self, block_id: &str) -> Result<Option<BlockVersionRecord>> {
        let versions = self
            .store
            .list_versions(block_id, Some(VersionStatus::Published))
            .await?;
        Ok(versions
            .into_iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version)))
    }

    pub async fn get_version(&self, version_id: &str) -> Result<BlockVersionRecord> {
        self.store
            .get_version(version_id)
            .await?
            .ok_or_else(|| BenchError::not_found("block_version", version_id))
    }

    /// Look up `slug@version`. `None` when either the block or the version is missing.
    pub async fn find_version(&self, slug: &str, version: &str) -> Result<Option<BlockVersionRecord>> {
        match self.find_block(slug).await? {
            Some(block) => Ok(self.store.find_version(&block.block_id, version).await?),
            None => Ok(None),
        }
    }

    /// Apply one state-machine edge to a version.
    ///
    /// The write is a compare-and-set on the status read here, so a version
    /// moved concurrently by someone else reports `IllegalTransition` with
    /// the status it was actually found in.
    #[instrument(skip(self, caller, event), fields(event = %event))]
    pub async fn transition(
        &self,
        caller: &Caller,
        version_id: &str,
        event: VersionEvent,
    ) -> Result<BlockVersionRecord> {
        caller.require_privileged(event.as_str())?;
        let current = self.get_version(version_id).await?;
        let next = apply_version_event(version_id, current.status, event)?;
        let published_at = (next == VersionStatus::Published).then(Utc::now);

        let updated = self
            .store
            .set_version_status(version_id, current.status, next, published_at)
            .await
            .map_err(|e| match e {
                StorageError::StatusConflict { current, .. } => BenchError::IllegalTransition {
                    entity: "block_version",
                    id: version_id.to_string(),
                    current,
                    attempted: event.to_string(),
                },
                other => other.into(),
            })?;

        METRICS.inc_version_transitions();
        emit_version_transitioned(
            version_id,
            current.status.as_str(),
            updated.status.as_str(),
            caller.principal(),
        );
        Ok(updated)
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockbench_state::fakes::MemoryBlockStore;
    use serde_json::json;

    fn registry() -> BlockRegistry {
        BlockRegistry::new(Arc::new(MemoryBlockStore::new()))
    }

    async fn with_block(reg: &BlockRegistry) {
        reg.register_or_update_block(
            &Caller::system(),
            "fusions.concat",
            BlockCategory::Fusion,
            "Concat Fusion",
            "Concatenate embeddings.",
        )
        .await
        .unwrap();
    }

    #[test]
    fn slug_rules() {
        assert!(validate_slug("unimodals.linear").is_ok());
        assert!(validate_slug("a-b_c.1").is_ok());
        assert!(validate_slug("Upper").is_err());
        assert!(validate_slug(".hidden").is_err());
        assert!(validate_slug("").is_err());
    }

    #[tokio::test]
    async fn register_is_idempotent_and_refreshes_display() {
        let reg = registry();
        with_block(&reg).await;
        let again = reg
            .register_or_update_block(
                &Caller::system(),
                "fusions.concat",
                BlockCategory::Fusion,
                "Concat",
                "new text",
            )
            .await
            .unwrap();
        assert_eq!(again.display_name, "Concat");
        assert_eq!(reg.list_blocks().await.unwrap().len(), 1);

        let err = reg
            .register_or_update_block(
                &Caller::system(),
                "fusions.concat",
                BlockCategory::Dataset,
                "x",
                "y",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::Validation(ValidationError::CategoryChange { .. })
        ));
    }

    #[tokio::test]
    async fn anonymous_cannot_mutate() {
        let reg = registry();
        let err = reg
            .register_or_update_block(&Caller::Anonymous, "a", BlockCategory::Fusion, "A", "")
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Forbidden(_)));
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected() {
        let reg = registry();
        with_block(&reg).await;
        let draft = VersionDraft::new("1.0.0", json!({}), json!({}));
        reg.publish_version(&Caller::system(), "fusions.concat", draft.clone())
            .await
            .unwrap();
        let err = reg
            .create_draft_version(&Caller::system(), "fusions.concat", draft)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::DuplicateVersion { .. }));

        let empty = VersionDraft::new("  ", json!({}), json!({}));
        assert!(reg
            .create_draft_version(&Caller::system(), "fusions.concat", empty)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn latest_published_uses_semver_and_skips_drafts() {
        let reg = registry();
        with_block(&reg).await;
        let sys = Caller::system();
        for v in ["1.2.0", "1.10.0", "1.9.0"] {
            reg.publish_version(&sys, "fusions.concat", VersionDraft::new(v, json!({}), json!({})))
                .await
                .unwrap();
        }
        reg.create_draft_version(&sys, "fusions.concat", VersionDraft::new("2.0.0", json!({}), json!({})))
            .await
            .unwrap();

        let latest = reg.latest_published("fusions.concat").await.unwrap().unwrap();
        assert_eq!(latest.version, "1.10.0");
        assert!(latest.published_at.is_some());

        let listed: Vec<String> = reg
            .list_published("fusions.concat")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(listed, ["1.2.0", "1.9.0", "1.10.0"]);

        let catalog = reg.list_blocks().await.unwrap();
        assert_eq!(
            catalog[0].latest_published.as_ref().map(|s| s.version.as_str()),
            Some("1.10.0")
        );
    }

    #[tokio::test]
    async fn transition_walks_the_state_machine() {
        let reg = registry();
        with_block(&reg).await;
        let sys = Caller::system();
        let v = reg
            .create_draft_version(&sys, "fusions.concat", VersionDraft::new("0.1.0", json!({}), json!({})))
            .await
            .unwrap();
        assert_eq!(v.status, VersionStatus::Draft);

        let err = reg
            .transition(&sys, &v.version_id, VersionEvent::Publish)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot publish from draft"));

        for event in [VersionEvent::Submit, VersionEvent::Approve, VersionEvent::Publish] {
            reg.transition(&sys, &v.version_id, event).await.unwrap();
        }
        let published = reg.get_version(&v.version_id).await.unwrap();
        assert_eq!(published.status, VersionStatus::Published);
        assert!(published.published_at.is_some());
        assert_eq!(published.digest, v.digest);

        let err = reg
            .transition(&Caller::Anonymous, &v.version_id, VersionEvent::Deprecate)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Forbidden(_)));
    }
}
