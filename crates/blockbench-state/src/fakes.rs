//! In-memory fakes for storage traits
//!
//! Provides `MemoryBlockStore`, `MemoryRunStore`, `MemoryReviewStore` and
//! `MemoryCandidateStore` that satisfy the trait contracts without any
//! external dependencies. Rows live in insertion-ordered vectors so listings
//! keep creation order even when timestamps tie.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::records::*;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemoryBlockStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryTables {
    blocks: Vec<BlockRecord>,
    versions: Vec<BlockVersionRecord>,
}

/// In-memory registry store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    tables: Mutex<RegistryTables>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn insert_block(&self, block: BlockRecord) -> StorageResult<BlockRecord> {
        let mut tables = lock(&self.tables)?;
        if tables.blocks.iter().any(|b| b.slug == block.slug) {
            return Err(StorageError::DuplicateKey {
                entity: "block",
                key: block.slug,
            });
        }
        tables.blocks.push(block.clone());
        Ok(block)
    }

    async fn update_block_display(
        &self,
        slug: &str,
        display_name: &str,
        description: &str,
    ) -> StorageResult<BlockRecord> {
        let mut tables = lock(&self.tables)?;
        let block = tables
            .blocks
            .iter_mut()
            .find(|b| b.slug == slug)
            .ok_or_else(|| StorageError::NotFound {
                entity: "block",
                id: slug.to_string(),
            })?;
        block.display_name = display_name.to_string();
        block.description = description.to_string();
        Ok(block.clone())
    }

    async fn get_block(&self, block_id: &str) -> StorageResult<Option<BlockRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables.blocks.iter().find(|b| b.block_id == block_id).cloned())
    }

    async fn get_block_by_slug(&self, slug: &str) -> StorageResult<Option<BlockRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables.blocks.iter().find(|b| b.slug == slug).cloned())
    }

    async fn list_blocks(&self) -> StorageResult<Vec<BlockRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables.blocks.clone())
    }

    async fn insert_version(
        &self,
        version: BlockVersionRecord,
    ) -> StorageResult<BlockVersionRecord> {
        let mut tables = lock(&self.tables)?;
        if tables
            .versions
            .iter()
            .any(|v| v.block_id == version.block_id && v.version == version.version)
        {
            return Err(StorageError::DuplicateKey {
                entity: "block_version",
                key: format!("{}@{}", version.block_id, version.version),
            });
        }
        tables.versions.push(version.clone());
        Ok(version)
    }

    async fn get_version(&self, version_id: &str) -> StorageResult<Option<BlockVersionRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned())
    }

    async fn find_version(
        &self,
        block_id: &str,
        version: &str,
    ) -> StorageResult<Option<BlockVersionRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .versions
            .iter()
            .find(|v| v.block_id == block_id && v.version == version)
            .cloned())
    }

    async fn list_versions(
        &self,
        block_id: &str,
        status: Option<VersionStatus>,
    ) -> StorageResult<Vec<BlockVersionRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .versions
            .iter()
            .filter(|v| v.block_id == block_id)
            .filter(|v| status.map(|s| v.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn set_version_status(
        &self,
        version_id: &str,
        expected: VersionStatus,
        next: VersionStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> StorageResult<BlockVersionRecord> {
        let mut tables = lock(&self.tables)?;
        let version = tables
            .versions
            .iter_mut()
            .find(|v| v.version_id == version_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "block_version",
                id: version_id.to_string(),
            })?;
        if version.status != expected {
            return Err(StorageError::StatusConflict {
                entity: "block_version",
                id: version_id.to_string(),
                current: version.status.to_string(),
                expected: expected.to_string(),
            });
        }
        version.status = next;
        if published_at.is_some() {
            version.published_at = published_at;
        }
        Ok(version.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

/// In-memory run ledger.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert_run(&self, run: RunRecord) -> StorageResult<RunRecord> {
        let mut runs = lock(&self.runs)?;
        if runs.iter().any(|r| r.run_id == run.run_id) {
            return Err(StorageError::DuplicateKey {
                entity: "pipeline_run",
                key: run.run_id,
            });
        }
        runs.push(run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> StorageResult<Option<RunRecord>> {
        let runs = lock(&self.runs)?;
        Ok(runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    async fn transition_run(
        &self,
        run_id: &str,
        expected: RunStatus,
        transition: RunTransition,
    ) -> StorageResult<RunRecord> {
        let mut runs = lock(&self.runs)?;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "pipeline_run",
                id: run_id.to_string(),
            })?;
        if run.status != expected {
            return Err(StorageError::StatusConflict {
                entity: "pipeline_run",
                id: run_id.to_string(),
                current: run.status.to_string(),
                expected: expected.to_string(),
            });
        }
        run.apply(&transition);
        Ok(run.clone())
    }

    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: usize,
    ) -> StorageResult<Vec<RunRecord>> {
        let runs = lock(&self.runs)?;
        Ok(runs
            .iter()
            .rev()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryReviewStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    reviews: Mutex<Vec<ReviewRecord>>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn insert_review(&self, review: ReviewRecord) -> StorageResult<ReviewRecord> {
        let mut reviews = lock(&self.reviews)?;
        reviews.push(review.clone());
        Ok(review)
    }

    async fn get_review(&self, review_id: &str) -> StorageResult<Option<ReviewRecord>> {
        let reviews = lock(&self.reviews)?;
        Ok(reviews.iter().find(|r| r.review_id == review_id).cloned())
    }

    async fn decide_review(
        &self,
        review_id: &str,
        state: ReviewState,
        notes: &str,
        decided_at: DateTime<Utc>,
    ) -> StorageResult<ReviewRecord> {
        let mut reviews = lock(&self.reviews)?;
        let review = reviews
            .iter_mut()
            .find(|r| r.review_id == review_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "review",
                id: review_id.to_string(),
            })?;
        if review.state != ReviewState::Pending {
            return Err(StorageError::StatusConflict {
                entity: "review",
                id: review_id.to_string(),
                current: review.state.to_string(),
                expected: ReviewState::Pending.to_string(),
            });
        }
        review.state = state;
        review.notes = notes.to_string();
        review.decided_at = Some(decided_at);
        Ok(review.clone())
    }

    async fn list_reviews(&self, state: Option<ReviewState>) -> StorageResult<Vec<ReviewRecord>> {
        let reviews = lock(&self.reviews)?;
        Ok(reviews
            .iter()
            .filter(|r| state.map(|s| r.state == s).unwrap_or(true))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryCandidateStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCandidateStore {
    candidates: Mutex<Vec<CandidateRecord>>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn insert_candidate(&self, candidate: CandidateRecord) -> StorageResult<CandidateRecord> {
        let mut candidates = lock(&self.candidates)?;
        candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn get_candidate(&self, candidate_id: &str) -> StorageResult<Option<CandidateRecord>> {
        let candidates = lock(&self.candidates)?;
        Ok(candidates
            .iter()
            .find(|c| c.candidate_id == candidate_id)
            .cloned())
    }

    async fn set_candidate_status(
        &self,
        candidate_id: &str,
        expected: &[CandidateStatus],
        next: CandidateStatus,
    ) -> StorageResult<CandidateRecord> {
        let mut candidates = lock(&self.candidates)?;
        let candidate = candidates
            .iter_mut()
            .find(|c| c.candidate_id == candidate_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "paper_candidate",
                id: candidate_id.to_string(),
            })?;
        if !expected.contains(&candidate.status) {
            return Err(StorageError::StatusConflict {
                entity: "paper_candidate",
                id: candidate_id.to_string(),
                current: candidate.status.to_string(),
                expected: expected
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
            });
        }
        candidate.status = next;
        Ok(candidate.clone())
    }

    async fn list_candidates(
        &self,
        status: Option<CandidateStatus>,
    ) -> StorageResult<Vec<CandidateRecord>> {
        let candidates = lock(&self.candidates)?;
        Ok(candidates
            .iter()
            .rev()
            .filter(|c| status.map(|s| c.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }
}
