//! Storage trait definitions for BlockBench
//!
//! These traits define the core storage abstractions:
//! - `BlockStore`: Blocks and block versions (registry rows)
//! - `RunStore`: Pipeline run ledger
//! - `ReviewStore`: Review decisions
//! - `CandidateStore`: Paper-derived block proposals
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.
//!
//! Status changes go through compare-and-set methods: the write only lands if
//! the stored status still equals `expected`, otherwise the store answers
//! `StorageError::StatusConflict` with the status it actually found. This is
//! what makes each transition atomic per row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::records::*;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// BlockStore
// ---------------------------------------------------------------------------

/// Registry persistence.
///
/// Guarantees:
/// - `slug` is unique across blocks.
/// - `(block_id, version)` is unique across versions; `insert_version`
///   answers `DuplicateKey` instead of overwriting.
/// - Listings are ordered by creation time (oldest first).
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Insert a new block. Fails with `DuplicateKey` if the slug is taken.
    async fn insert_block(&self, block: BlockRecord) -> StorageResult<BlockRecord>;

    /// Refresh display metadata of an existing block in place.
    async fn update_block_display(
        &self,
        slug: &str,
        display_name: &str,
        description: &str,
    ) -> StorageResult<BlockRecord>;

    async fn get_block(&self, block_id: &str) -> StorageResult<Option<BlockRecord>>;

    async fn get_block_by_slug(&self, slug: &str) -> StorageResult<Option<BlockRecord>>;

    async fn list_blocks(&self) -> StorageResult<Vec<BlockRecord>>;

    /// Insert a new version. Fails with `DuplicateKey` if `(block_id, version)` exists.
    async fn insert_version(&self, version: BlockVersionRecord)
        -> StorageResult<BlockVersionRecord>;

    async fn get_version(&self, version_id: &str) -> StorageResult<Option<BlockVersionRecord>>;

    async fn find_version(
        &self,
        block_id: &str,
        version: &str,
    ) -> StorageResult<Option<BlockVersionRecord>>;

    /// List versions of a block, optionally filtered by status.
    async fn list_versions(
        &self,
        block_id: &str,
        status: Option<VersionStatus>,
    ) -> StorageResult<Vec<BlockVersionRecord>>;

    /// Atomically move a version from `expected` to `next`.
    ///
    /// `published_at`, when given, is stamped in the same write.
    async fn set_version_status(
        &self,
        version_id: &str,
        expected: VersionStatus,
        next: VersionStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> StorageResult<BlockVersionRecord>;
}

// ---------------------------------------------------------------------------
// RunStore
// ---------------------------------------------------------------------------

/// Pipeline run ledger.
///
/// Guarantees:
/// - A run transitions: Queued → Running → Succeeded | Failed.
/// - `transition_run` is a compare-and-set on status, so two writers can
///   never both move the same run out of the same state.
/// - Terminal runs are immutable.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert_run(&self, run: RunRecord) -> StorageResult<RunRecord>;

    async fn get_run(&self, run_id: &str) -> StorageResult<Option<RunRecord>>;

    /// Apply `transition` if the run is currently in `expected`.
    async fn transition_run(
        &self,
        run_id: &str,
        expected: RunStatus,
        transition: RunTransition,
    ) -> StorageResult<RunRecord>;

    /// List runs newest first, optionally filtered by status.
    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: usize,
    ) -> StorageResult<Vec<RunRecord>>;
}

// ---------------------------------------------------------------------------
// ReviewStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_review(&self, review: ReviewRecord) -> StorageResult<ReviewRecord>;

    async fn get_review(&self, review_id: &str) -> StorageResult<Option<ReviewRecord>>;

    /// Decide a pending review. Fails with `StatusConflict` if already decided.
    async fn decide_review(
        &self,
        review_id: &str,
        state: ReviewState,
        notes: &str,
        decided_at: DateTime<Utc>,
    ) -> StorageResult<ReviewRecord>;

    /// List reviews oldest first, optionally filtered by state.
    async fn list_reviews(&self, state: Option<ReviewState>) -> StorageResult<Vec<ReviewRecord>>;
}

// ---------------------------------------------------------------------------
// CandidateStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn insert_candidate(&self, candidate: CandidateRecord) -> StorageResult<CandidateRecord>;

    async fn get_candidate(&self, candidate_id: &str) -> StorageResult<Option<CandidateRecord>>;

    /// Move a candidate to `next` if its current status is one of `expected`.
    async fn set_candidate_status(
        &self,
        candidate_id: &str,
        expected: &[CandidateStatus],
        next: CandidateStatus,
    ) -> StorageResult<CandidateRecord>;

    /// List candidates newest first, optionally filtered by status.
    async fn list_candidates(
        &self,
        status: Option<CandidateStatus>,
    ) -> StorageResult<Vec<CandidateRecord>>;
}
