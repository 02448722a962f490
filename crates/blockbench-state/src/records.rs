//! Persisted record definitions
//!
//! Tables:
//! - blocks: Block identity and display metadata
//! - block_versions: Versioned block contracts (schemas, digest, lifecycle status)
//! - pipeline_runs: Run ledger rows (spec snapshot, locked manifest, outcome)
//! - reviews: Human review decisions over block versions and paper candidates
//! - paper_candidates: Proposed blocks awaiting review

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generate a fresh record identifier.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Closed set of block categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockCategory {
    #[serde(rename = "datasets")]
    Dataset,
    #[serde(rename = "unimodals")]
    UnimodalEncoder,
    #[serde(rename = "fusions")]
    Fusion,
    #[serde(rename = "objective_functions")]
    Objective,
    #[serde(rename = "training_structures")]
    TrainingStructure,
    #[serde(rename = "robustness")]
    Robustness,
    #[serde(rename = "eval_scripts")]
    Evaluator,
}

impl BlockCategory {
    pub const ALL: [BlockCategory; 7] = [
        BlockCategory::Dataset,
        BlockCategory::UnimodalEncoder,
        BlockCategory::Fusion,
        BlockCategory::Objective,
        BlockCategory::TrainingStructure,
        BlockCategory::Robustness,
        BlockCategory::Evaluator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockCategory::Dataset => "datasets",
            BlockCategory::UnimodalEncoder => "unimodals",
            BlockCategory::Fusion => "fusions",
            BlockCategory::Objective => "objective_functions",
            BlockCategory::TrainingStructure => "training_structures",
            BlockCategory::Robustness => "robustness",
            BlockCategory::Evaluator => "eval_scripts",
        }
    }

    /// Parse the wire name of a category.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered block identity. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_id: String,
    /// Stable, human-assigned, unique
    pub slug: String,
    pub category: BlockCategory,
    pub display_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl BlockRecord {
    pub fn new(slug: &str, category: BlockCategory, display_name: &str, description: &str) -> Self {
        Self {
            block_id: new_record_id(),
            slug: slug.to_string(),
            category,
            display_name: display_name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Block versions
// ---------------------------------------------------------------------------

/// Lifecycle status of a block version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    PendingReview,
    Approved,
    Published,
    Deprecated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::PendingReview => "pending_review",
            VersionStatus::Approved => "approved",
            VersionStatus::Published => "published",
            VersionStatus::Deprecated => "deprecated",
        }
    }

    /// Whether a version in this status may be locked into a pipeline.
    pub fn is_executable(&self) -> bool {
        matches!(self, VersionStatus::Published | VersionStatus::Deprecated)
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities a block implementation requires. Everything defaults to deny.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPermissions {
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub filesystem: bool,
    #[serde(default)]
    pub gpu: bool,
    /// Forward-compatible capability flags not modelled above.
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Declared minimal test expectations for a block version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTests {
    #[serde(default = "default_smoke")]
    pub smoke: bool,
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_smoke() -> bool {
    true
}

impl Default for BlockTests {
    fn default() -> Self {
        Self {
            smoke: true,
            extra: serde_json::Map::new(),
        }
    }
}

/// One version of a block. `(block_id, version)` is unique and the digest is
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockVersionRecord {
    pub version_id: String,
    pub block_id: String,
    pub version: String,
    pub status: VersionStatus,
    pub digest: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub changelog: String,
    pub permissions: BlockPermissions,
    pub tests: BlockTests,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Pipeline runs
// ---------------------------------------------------------------------------

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run ledger row. Snapshots are stored as opaque JSON documents so they can
/// be replayed exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
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

/// Fields written by a single run state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTransition {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RunRecord {
    /// Apply a transition's fields; unset optional fields keep their value.
    pub fn apply(&mut self, transition: &RunTransition) {
        self.status = transition.status;
        if transition.started_at.is_some() {
            self.started_at = transition.started_at;
        }
        if transition.finished_at.is_some() {
            self.finished_at = transition.finished_at;
        }
        if transition.metrics.is_some() {
            self.metrics = transition.metrics.clone();
        }
        if transition.error.is_some() {
            self.error = transition.error.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::Approved => "approved",
            ReviewState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTargetType {
    BlockVersion,
    PaperCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub review_id: String,
    pub target_type: ReviewTargetType,
    pub target_id: String,
    pub state: ReviewState,
    pub reviewer: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    pub fn pending(target_type: ReviewTargetType, target_id: &str, reviewer: &str) -> Self {
        Self {
            review_id: new_record_id(),
            target_type,
            target_id: target_id.to_string(),
            state: ReviewState::Pending,
            reviewer: reviewer.to_string(),
            notes: String::new(),
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Paper candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Draft => "draft",
            CandidateStatus::PendingReview => "pending_review",
            CandidateStatus::Approved => "approved",
            CandidateStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate's source paper came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRef {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub paper: PaperRef,
    pub status: CandidateStatus,
    /// Structured proposal document (list of proposed blocks)
    pub proposed_blocks: serde_json::Value,
    /// Free-form proposal text. Stored and returned, never interpreted.
    pub proposal_text: String,
    pub created_at: DateTime<Utc>,
}
