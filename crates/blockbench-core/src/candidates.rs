//! Paper-derived block proposals.
//!
//! A candidate carries a structured list of proposed blocks plus an opaque
//! proposal text that is stored and returned but never interpreted. Once a
//! candidate is approved its proposals can be materialized into draft block
//! versions, which then go through the normal review workflow.

use std::sync::Arc;

use blockbench_state::{
    new_record_id, BlockCategory, BlockPermissions, BlockTests, CandidateRecord, CandidateStatus,
    CandidateStore, PaperRef, StorageError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::access::Caller;
use crate::domain::error::{BenchError, Result, ValidationError};
use crate::registry::{BlockRegistry, VersionDraft};

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_ports() -> Value {
    Value::Array(Vec::new())
}

fn default_config_schema() -> Value {
    json!({"type": "object", "properties": {}, "additionalProperties": true})
}

/// One block proposed by a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedBlock {
    pub block_id: String,
    pub category: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_ports")]
    pub inputs: Value,
    #[serde(default = "default_ports")]
    pub outputs: Value,
    #[serde(default = "default_config_schema")]
    pub config_schema: Value,
    #[serde(default)]
    pub permissions: BlockPermissions,
    #[serde(default)]
    pub tests: BlockTests,
    #[serde(default)]
    pub changelog: Option<String>,
}

/// Lower-case, keep `[alnum._-]`, turn whitespace into `_`, drop the rest,
/// then trim `._-` from both ends.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    out.trim_matches(|c| matches!(c, '.' | '_' | '-')).to_string()
}

/// Accept `{"candidates": [...]}` or a bare array.
pub fn parse_proposals(doc: &Value) -> Result<Vec<ProposedBlock>> {
    let items = match doc {
        Value::Object(map) => map.get("candidates").cloned().unwrap_or(Value::Null),
        Value::Array(_) => doc.clone(),
        _ => Value::Null,
    };
    match items {
        Value::Array(items) => Ok(serde_json::from_value(Value::Array(items))?),
        Value::Null => Ok(Vec::new()),
        _ => Err(ValidationError::InvalidField {
            field: "proposedBlocks.candidates".to_string(),
            reason: "must be an array".to_string(),
        }
        .into()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedVersion {
    pub block_id: String,
    pub version: String,
    pub block_version_id: String,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedVersion {
    pub block_id: String,
    pub version: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeReport {
    pub candidate_id: String,
    pub created: Vec<MaterializedVersion>,
    pub skipped: Vec<SkippedVersion>,
}

#[derive(Clone)]
pub struct CandidateWorkflow {
    registry: BlockRegistry,
    candidates: Arc<dyn CandidateStore>,
}

impl CandidateWorkflow {
    pub fn new(registry: BlockRegistry, candidates: Arc<dyn CandidateStore>) -> Self {
        Self {
            registry,
            candidates,
        }
    }

    /// Record a new candidate in `draft`.
    #[instrument(skip(self, caller, proposed_blocks, proposal_text), fields(paper = %paper.external_id))]
    pub async fn propose(
        &self,
        caller: &Caller,
        paper: PaperRef,
        proposed_blocks: Value,
        proposal_text: &str,
    ) -> Result<CandidateRecord> {
        caller.require_privileged("propose candidate")?;
        // reject malformed documents up front rather than at materialization
        parse_proposals(&proposed_blocks)?;
        let record = CandidateRecord {
            candidate_id: new_record_id(),
            paper,
            status: CandidateStatus::Draft,
            proposed_blocks,
            proposal_text: proposal_text.to_string(),
            created_at: Utc::now(),
        };
        let stored = self.candidates.insert_candidate(record).await?;
        info!(candidate_id = %stored.candidate_id, "candidate proposed");
        Ok(stored)
    }

    pub async fn list(&self, status: Option<CandidateStatus>) -> Result<Vec<CandidateRecord>> {
        Ok(self.candidates.list_candidates(status).await?)
    }

    pub async fn get(&self, candidate_id: &str) -> Result<CandidateRecord> {
        self.candidates
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| BenchError::not_found("paper_candidate", candidate_id))
    }

    pub async fn approve(&self, caller: &Caller, candidate_id: &str) -> Result<CandidateRecord> {
        self.decide(caller, candidate_id, CandidateStatus::Approved, "approve")
            .await
    }

    pub async fn reject(&self, caller: &Caller, candidate_id: &str) -> Result<CandidateRecord> {
        self.decide(caller, candidate_id, CandidateStatus::Rejected, "reject")
            .await
    }

    async fn decide(
        &self,
        caller: &Caller,
        candidate_id: &str,
        next: CandidateStatus,
        attempted: &str,
    ) -> Result<CandidateRecord> {
        caller.require_privileged("decide candidate")?;
        self.candidates
            .set_candidate_status(
                candidate_id,
                &[CandidateStatus::Draft, CandidateStatus::PendingReview],
                next,
            )
            .await
            .map_err(|e| match e {
                StorageError::StatusConflict { current, .. } => BenchError::IllegalTransition {
                    entity: "paper_candidate",
                    id: candidate_id.to_string(),
                    current,
                    attempted: attempted.to_string(),
                },
                StorageError::NotFound { .. } => BenchError::not_found("paper_candidate", candidate_id),
                other => other.into(),
            })
    }

    /// Turn an approved candidate's proposals into draft block versions.
    ///
    /// Existing blocks are reused. A `(slug, version)` pair that already
    /// exists is reported under `skipped` instead of failing the call.
    #[instrument(skip(self, caller))]
    pub async fn materialize(&self, caller: &Caller, candidate_id: &str) -> Result<MaterializeReport> {
        caller.require_privileged("materialize candidate")?;
        let candidate = self.get(candidate_id).await?;
        if candidate.status != CandidateStatus::Approved {
            return Err(BenchError::IllegalTransition {
                entity: "paper_candidate",
                id: candidate_id.to_string(),
                current: candidate.status.to_string(),
                attempted: "materialize".to_string(),
            });
        }

        let proposals = parse_proposals(&candidate.proposed_blocks)?;
        if proposals.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "proposedBlocks".to_string(),
                reason: "no proposed blocks to materialize".to_string(),
            }
            .into());
        }

        let mut report = MaterializeReport {
            candidate_id: candidate_id.to_string(),
            created: Vec::new(),
            skipped: Vec::new(),
        };

        for proposal in proposals {
            let slug = slugify(&proposal.block_id);
            if slug.is_empty() {
                return Err(ValidationError::InvalidField {
                    field: "blockId".to_string(),
                    reason: format!("'{}' has no usable characters", proposal.block_id),
                }
                .into());
            }
            let category = BlockCategory::parse(proposal.category.trim()).ok_or_else(|| {
                ValidationError::InvalidField {
                    field: "category".to_string(),
                    reason: format!("invalid category for {slug}: {}", proposal.category),
                }
            })?;

            if self.registry.find_block(&slug).await?.is_none() {
                let display_name = proposal.display_name.clone().unwrap_or_else(|| slug.clone());
                self.registry
                    .register_or_update_block(caller, &slug, category, &display_name, &proposal.description)
                    .await?;
            }

            if let Some(existing) = self.registry.find_version(&slug, &proposal.version).await? {
                report.skipped.push(SkippedVersion {
                    block_id: slug,
                    version: proposal.version,
                    reason: "version exists".to_string(),
                    block_version_id: Some(existing.version_id),
                });
                continue;
            }

            let changelog = proposal
                .changelog
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| format!("Generated from paper {}.", candidate.paper.external_id));
            let draft = VersionDraft {
                version: proposal.version.clone(),
                input_schema: proposal.config_schema.clone(),
                output_schema: json!({"ports": {"inputs": proposal.inputs, "outputs": proposal.outputs}}),
                changelog,
                permissions: proposal.permissions.clone(),
                tests: proposal.tests.clone(),
            };

            match self.registry.create_draft_version(caller, &slug, draft).await {
                Ok(v) => report.created.push(MaterializedVersion {
                    block_id: slug,
                    version: v.version,
                    block_version_id: v.version_id,
                    digest: v.digest,
                }),
                Err(BenchError::DuplicateVersion { .. }) => {
                    warn!(%slug, "version appeared concurrently; skipping");
                    report.skipped.push(SkippedVersion {
                        block_id: slug,
                        version: proposal.version,
                        reason: "version exists".to_string(),
                        block_version_id: None,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            "candidate materialized"
        );
        Ok(report)
    }
}

pub const DEMO_ARXIV_ID: &str = "demo.00001v1";

/// Insert the demo candidate when the store holds no candidates at all.
pub async fn seed_demo_candidate(workflow: &CandidateWorkflow) -> Result<Option<CandidateRecord>> {
    if !workflow.list(None).await?.is_empty() {
        return Ok(None);
    }
    let paper = PaperRef {
        source: "arxiv".to_string(),
        external_id: DEMO_ARXIV_ID.to_string(),
        title: "Demo Paper: Multimodal Toy Fusion for MVP Preview".to_string(),
        url: "https://arxiv.org/abs/demo.00001".to_string(),
    };
    let record = workflow
        .propose(&Caller::system(), paper, json!({"candidates": []}), "")
        .await?;
    // shown to reviewers straight away
    let record = workflow
        .candidates
        .set_candidate_status(
            &record.candidate_id,
            &[CandidateStatus::Draft],
            CandidateStatus::PendingReview,
        )
        .await?;
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockbench_state::fakes::{MemoryBlockStore, MemoryCandidateStore};
    use blockbench_state::VersionStatus;

    fn workflow() -> (CandidateWorkflow, BlockRegistry) {
        let registry = BlockRegistry::new(Arc::new(MemoryBlockStore::new()));
        (
            CandidateWorkflow::new(registry.clone(), Arc::new(MemoryCandidateStore::new())),
            registry,
        )
    }

    fn paper() -> PaperRef {
        PaperRef {
            source: "arxiv".to_string(),
            external_id: "2401.00001".to_string(),
            title: "Late fusion".to_string(),
            url: "https://arxiv.org/abs/2401.00001".to_string(),
        }
    }

    fn proposals() -> Value {
        json!({"candidates": [{
            "blockId": "Fusions.Late Concat!",
            "category": "fusions",
            "displayName": "Late Concat",
            "inputs": [{"name": "embedA", "portType": "tensor.embed"}],
            "outputs": [{"name": "fused", "portType": "tensor.fused"}]
        }]})
    }

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("  Fusions.Late Concat! "), "fusions.late_concat");
        assert_eq!(slugify("--a b--"), "a_b");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn proposals_accept_object_or_array() {
        let from_obj = parse_proposals(&proposals()).unwrap();
        let from_arr = parse_proposals(&proposals()["candidates"]).unwrap();
        assert_eq!(from_obj, from_arr);
        assert_eq!(from_obj[0].version, "0.1.0");
        assert_eq!(from_obj[0].config_schema["additionalProperties"], true);
        assert!(parse_proposals(&json!({"candidates": 3})).is_err());
    }

    #[tokio::test]
    async fn materialize_requires_approval_and_creates_drafts() {
        let (wf, registry) = workflow();
        let sys = Caller::system();
        let candidate = wf.propose(&sys, paper(), proposals(), "free text").await.unwrap();
        assert_eq!(candidate.status, CandidateStatus::Draft);
        assert_eq!(candidate.proposal_text, "free text");

        let err = wf.materialize(&sys, &candidate.candidate_id).await.unwrap_err();
        assert!(matches!(err, BenchError::IllegalTransition { .. }));

        wf.approve(&sys, &candidate.candidate_id).await.unwrap();
        let report = wf.materialize(&sys, &candidate.candidate_id).await.unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].block_id, "fusions.late_concat");

        let versions = registry.list_versions("fusions.late_concat").await.unwrap();
        assert_eq!(versions[0].status, VersionStatus::Draft);
        assert_eq!(versions[0].changelog, "Generated from paper 2401.00001.");
        assert_eq!(versions[0].output_schema["ports"]["outputs"][0]["name"], "fused");

        let again = wf.materialize(&sys, &candidate.candidate_id).await.unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.skipped[0].reason, "version exists");
    }

    #[tokio::test]
    async fn invalid_category_and_empty_proposals() {
        let (wf, _) = workflow();
        let sys = Caller::system();
        let bad = wf
            .propose(&sys, paper(), json!([{"blockId": "x", "category": "encoders"}]), "")
            .await
            .unwrap();
        wf.approve(&sys, &bad.candidate_id).await.unwrap();
        assert!(wf.materialize(&sys, &bad.candidate_id).await.is_err());

        let seeded = seed_demo_candidate(&wf).await.unwrap();
        assert!(seeded.is_none());
    }

    #[tokio::test]
    async fn demo_candidate_seeds_once() {
        let (wf, _) = workflow();
        let first = seed_demo_candidate(&wf).await.unwrap().unwrap();
        assert_eq!(first.paper.external_id, DEMO_ARXIV_ID);
        assert_eq!(first.status, CandidateStatus::PendingReview);
        assert!(seed_demo_candidate(&wf).await.unwrap().is_none());

        wf.approve(&Caller::system(), &first.candidate_id).await.unwrap();
        let err = wf.materialize(&Caller::system(), &first.candidate_id).await.unwrap_err();
        assert!(matches!(err, BenchError::Validation(_)));

        let err = wf.reject(&Caller::system(), &first.candidate_id).await.unwrap_err();
        assert!(err.to_string().contains("cannot reject from approved"));
    }
}
