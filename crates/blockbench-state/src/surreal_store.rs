//! SurrealDB-backed storage trait implementations
//!
//! Rows are written through private `Db*` structs that carry SurrealDB
//! datetimes, converting to/from the public records at the boundary.
//! Status changes are single `UPDATE ... WHERE status = $expected` statements;
//! an empty result means the guard failed and the row is re-read to report
//! what was actually there.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::records::*;
use crate::storage_traits::*;

fn to_utc(dt: SurrealDatetime) -> DateTime<Utc> {
    DateTime::<Utc>::from(dt)
}

// ---------------------------------------------------------------------------
// Row mappings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbBlock {
    block_id: String,
    slug: String,
    category: BlockCategory,
    display_name: String,
    description: String,
    created_at: SurrealDatetime,
}

impl From<BlockRecord> for DbBlock {
    fn from(r: BlockRecord) -> Self {
        Self {
            block_id: r.block_id,
            slug: r.slug,
            category: r.category,
            display_name: r.display_name,
            description: r.description,
            created_at: SurrealDatetime::from(r.created_at),
        }
    }
}

impl From<DbBlock> for BlockRecord {
    fn from(r: DbBlock) -> Self {
        Self {
            block_id: r.block_id,
            slug: r.slug,
            category: r.category,
            display_name: r.display_name,
            description: r.description,
            created_at: to_utc(r.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbVersion {
    version_id: String,
    block_id: String,
    version: String,
    status: VersionStatus,
    digest: String,
    input_schema: serde_json::Value,
    output_schema: serde_json::Value,
    changelog: String,
    permissions: BlockPermissions,
    tests: BlockTests,
    created_at: SurrealDatetime,
    #[serde(default)]
    published_at: Option<SurrealDatetime>,
}

impl From<BlockVersionRecord> for DbVersion {
    fn from(r: BlockVersionRecord) -> Self {
        Self {
            version_id: r.version_id,
            block_id: r.block_id,
            version: r.version,
            status: r.status,
            digest: r.digest,
            input_schema: r.input_schema,
            output_schema: r.output_schema,
            changelog: r.changelog,
            permissions: r.permissions,
            tests: r.tests,
            created_at: SurrealDatetime::from(r.created_at),
            published_at: r.published_at.map(SurrealDatetime::from),
        }
    }
}

impl From<DbVersion> for BlockVersionRecord {
    fn from(r: DbVersion) -> Self {
        Self {
            version_id: r.version_id,
            block_id: r.block_id,
            version: r.version,
            status: r.status,
            digest: r.digest,
            input_schema: r.input_schema,
            output_schema: r.output_schema,
            changelog: r.changelog,
            permissions: r.permissions,
            tests: r.tests,
            created_at: to_utc(r.created_at),
            published_at: r.published_at.map(to_utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbRun {
    run_id: String,
    #[serde(default)]
    pipeline_id: Option<String>,
    status: RunStatus,
    spec: serde_json::Value,
    locked_blocks: serde_json::Value,
    runtime_env: serde_json::Value,
    #[serde(default)]
    metrics: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    created_at: SurrealDatetime,
    #[serde(default)]
    started_at: Option<SurrealDatetime>,
    #[serde(default)]
    finished_at: Option<SurrealDatetime>,
}

impl From<RunRecord> for DbRun {
    fn from(r: RunRecord) -> Self {
        Self {
            run_id: r.run_id,
            pipeline_id: r.pipeline_id,
            status: r.status,
            spec: r.spec,
            locked_blocks: r.locked_blocks,
            runtime_env: r.runtime_env,
            metrics: r.metrics,
            error: r.error,
            created_at: SurrealDatetime::from(r.created_at),
            started_at: r.started_at.map(SurrealDatetime::from),
            finished_at: r.finished_at.map(SurrealDatetime::from),
        }
    }
}

impl From<DbRun> for RunRecord {
    fn from(r: DbRun) -> Self {
        Self {
            run_id: r.run_id,
            pipeline_id: r.pipeline_id,
            status: r.status,
            spec: r.spec,
            locked_blocks: r.locked_blocks,
            runtime_env: r.runtime_env,
            metrics: r.metrics,
            error: r.error,
            created_at: to_utc(r.created_at),
            started_at: r.started_at.map(to_utc),
            finished_at: r.finished_at.map(to_utc),
        }
    }
}

/// Partial run document merged by a transition. Unset fields are omitted so
/// the stored values survive.
#[derive(Debug, Serialize)]
struct DbRunPatch {
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<SurrealDatetime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<SurrealDatetime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<RunTransition> for DbRunPatch {
    fn from(t: RunTransition) -> Self {
        Self {
            status: t.status,
            started_at: t.started_at.map(SurrealDatetime::from),
            finished_at: t.finished_at.map(SurrealDatetime::from),
            metrics: t.metrics,
            error: t.error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbReview {
    review_id: String,
    target_type: ReviewTargetType,
    target_id: String,
    state: ReviewState,
    reviewer: String,
    notes: String,
    created_at: SurrealDatetime,
    #[serde(default)]
    decided_at: Option<SurrealDatetime>,
}

impl From<ReviewRecord> for DbReview {
    fn from(r: ReviewRecord) -> Self {
        Self {
            review_id: r.review_id,
            target_type: r.target_type,
            target_id: r.target_id,
            state: r.state,
            reviewer: r.reviewer,
            notes: r.notes,
            created_at: SurrealDatetime::from(r.created_at),
            decided_at: r.decided_at.map(SurrealDatetime::from),
        }
    }
}

impl From<DbReview> for ReviewRecord {
    fn from(r: DbReview) -> Self {
        Self {
            review_id: r.review_id,
            target_type: r.target_type,
            target_id: r.target_id,
            state: r.state,
            reviewer: r.reviewer,
            notes: r.notes,
            created_at: to_utc(r.created_at),
            decided_at: r.decided_at.map(to_utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbCandidate {
    candidate_id: String,
    paper: PaperRef,
    status: CandidateStatus,
    proposed_blocks: serde_json::Value,
    proposal_text: String,
    created_at: SurrealDatetime,
}

impl From<CandidateRecord> for DbCandidate {
    fn from(r: CandidateRecord) -> Self {
        Self {
            candidate_id: r.candidate_id,
            paper: r.paper,
            status: r.status,
            proposed_blocks: r.proposed_blocks,
            proposal_text: r.proposal_text,
            created_at: SurrealDatetime::from(r.created_at),
        }
    }
}

impl From<DbCandidate> for CandidateRecord {
    fn from(r: DbCandidate) -> Self {
        Self {
            candidate_id: r.candidate_id,
            paper: r.paper,
            status: r.status,
            proposed_blocks: r.proposed_blocks,
            proposal_text: r.proposal_text,
            created_at: to_utc(r.created_at),
        }
    }
}

// ---------------------------------------------------------------------------
// SurrealStore
// ---------------------------------------------------------------------------

/// `LIMIT` clause for a listing. SurrealQL cannot parse limits like
/// `usize::MAX`, so anything past `u32::MAX` means no limit.
fn limit_clause(limit: usize) -> String {
    match u32::try_from(limit) {
        Ok(n) => format!(" LIMIT {n}"),
        Err(_) => String::new(),
    }
}

/// SurrealDB implementation of every storage trait over one shared handle.
#[derive(Clone)]
pub struct SurrealStore {
    handle: Arc<SurrealHandle>,
}

impl SurrealStore {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }

    /// Run a single-statement query with bindings and collect rows of `T`.
    async fn select<T>(
        &self,
        sql: &str,
        bindings: Vec<(&'static str, serde_json::Value)>,
    ) -> StorageResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut query = self.handle.db().query(sql.to_string());
        for (key, value) in bindings {
            query = query.bind((key, value));
        }
        let mut response = query.await?;
        let rows: Vec<T> = response.take(0)?;
        Ok(rows)
    }

    async fn create<T>(&self, table: &'static str, row: T) -> StorageResult<T>
    where
        T: Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        let created: Option<T> = self.handle.db().create(table).content(row).await?;
        created.ok_or_else(|| StorageError::Backend(format!("failed to create {table} record")))
    }
}

fn first<T>(rows: Vec<T>) -> Option<T> {
    rows.into_iter().next()
}

#[async_trait]
impl BlockStore for SurrealStore {
    #[instrument(skip(self, block), fields(slug = %block.slug))]
    async fn insert_block(&self, block: BlockRecord) -> StorageResult<BlockRecord> {
        if self.get_block_by_slug(&block.slug).await?.is_some() {
            return Err(StorageError::DuplicateKey {
                entity: "block",
                key: block.slug,
            });
        }
        let created = self.create("blocks", DbBlock::from(block)).await?;
        debug!("Block created: {}", created.slug);
        Ok(created.into())
    }

    async fn update_block_display(
        &self,
        slug: &str,
        display_name: &str,
        description: &str,
    ) -> StorageResult<BlockRecord> {
        let rows: Vec<DbBlock> = self
            .select(
                "UPDATE blocks SET display_name = $display_name, description = $description \
                 WHERE slug = $slug RETURN AFTER",
                vec![
                    ("slug", slug.into()),
                    ("display_name", display_name.into()),
                    ("description", description.into()),
                ],
            )
            .await?;
        first(rows)
            .map(Into::into)
            .ok_or_else(|| StorageError::NotFound {
                entity: "block",
                id: slug.to_string(),
            })
    }

    async fn get_block(&self, block_id: &str) -> StorageResult<Option<BlockRecord>> {
        let rows: Vec<DbBlock> = self
            .select(
                "SELECT * FROM blocks WHERE block_id = $id",
                vec![("id", block_id.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    async fn get_block_by_slug(&self, slug: &str) -> StorageResult<Option<BlockRecord>> {
        let rows: Vec<DbBlock> = self
            .select(
                "SELECT * FROM blocks WHERE slug = $slug",
                vec![("slug", slug.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    async fn list_blocks(&self) -> StorageResult<Vec<BlockRecord>> {
        let rows: Vec<DbBlock> = self
            .select("SELECT * FROM blocks ORDER BY created_at ASC", vec![])
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, version), fields(block_id = %version.block_id, version = %version.version))]
    async fn insert_version(
        &self,
        version: BlockVersionRecord,
    ) -> StorageResult<BlockVersionRecord> {
        if self
            .find_version(&version.block_id, &version.version)
            .await?
            .is_some()
        {
            return Err(StorageError::DuplicateKey {
                entity: "block_version",
                key: format!("{}@{}", version.block_id, version.version),
            });
        }
        let created = self.create("block_versions", DbVersion::from(version)).await?;
        Ok(created.into())
    }

    async fn get_version(&self, version_id: &str) -> StorageResult<Option<BlockVersionRecord>> {
        let rows: Vec<DbVersion> = self
            .select(
                "SELECT * FROM block_versions WHERE version_id = $id",
                vec![("id", version_id.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    async fn find_version(
        &self,
        block_id: &str,
        version: &str,
    ) -> StorageResult<Option<BlockVersionRecord>> {
        let rows: Vec<DbVersion> = self
            .select(
                "SELECT * FROM block_versions WHERE block_id = $block_id AND version = $version",
                vec![("block_id", block_id.into()), ("version", version.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    async fn list_versions(
        &self,
        block_id: &str,
        status: Option<VersionStatus>,
    ) -> StorageResult<Vec<BlockVersionRecord>> {
        let rows: Vec<DbVersion> = match status {
            Some(status) => {
                self.select(
                    "SELECT * FROM block_versions WHERE block_id = $block_id AND status = $status \
                     ORDER BY created_at ASC",
                    vec![
                        ("block_id", block_id.into()),
                        ("status", status.as_str().into()),
                    ],
                )
                .await?
            }
            None => {
                self.select(
                    "SELECT * FROM block_versions WHERE block_id = $block_id ORDER BY created_at ASC",
                    vec![("block_id", block_id.into())],
                )
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, published_at))]
    async fn set_version_status(
        &self,
        version_id: &str,
        expected: VersionStatus,
        next: VersionStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> StorageResult<BlockVersionRecord> {
        let mut query = match published_at {
            Some(ts) => self
                .handle
                .db()
                .query(
                    "UPDATE block_versions SET status = $next, published_at = $published_at \
                     WHERE version_id = $id AND status = $expected RETURN AFTER",
                )
                .bind(("published_at", SurrealDatetime::from(ts))),
            None => self.handle.db().query(
                "UPDATE block_versions SET status = $next \
                 WHERE version_id = $id AND status = $expected RETURN AFTER",
            ),
        };
        query = query
            .bind(("id", version_id.to_string()))
            .bind(("expected", expected.as_str()))
            .bind(("next", next.as_str()));
        let mut response = query.await?;
        let rows: Vec<DbVersion> = response.take(0)?;
        if let Some(row) = first(rows) {
            return Ok(row.into());
        }

        match self.get_version(version_id).await? {
            None => Err(StorageError::NotFound {
                entity: "block_version",
                id: version_id.to_string(),
            }),
            Some(current) => Err(StorageError::StatusConflict {
                entity: "block_version",
                id: version_id.to_string(),
                current: current.status.to_string(),
                expected: expected.to_string(),
            }),
        }
    }
}

#[async_trait]
impl RunStore for SurrealStore {
    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    async fn insert_run(&self, run: RunRecord) -> StorageResult<RunRecord> {
        if self.get_run(&run.run_id).await?.is_some() {
            return Err(StorageError::DuplicateKey {
                entity: "pipeline_run",
                key: run.run_id,
            });
        }
        let created = self.create("pipeline_runs", DbRun::from(run)).await?;
        Ok(created.into())
    }

    async fn get_run(&self, run_id: &str) -> StorageResult<Option<RunRecord>> {
        let rows: Vec<DbRun> = self
            .select(
                "SELECT * FROM pipeline_runs WHERE run_id = $id",
                vec![("id", run_id.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    #[instrument(skip(self, transition), fields(next = %transition.status))]
    async fn transition_run(
        &self,
        run_id: &str,
        expected: RunStatus,
        transition: RunTransition,
    ) -> StorageResult<RunRecord> {
        let mut response = self
            .handle
            .db()
            .query(
                "UPDATE pipeline_runs MERGE $patch \
                 WHERE run_id = $id AND status = $expected RETURN AFTER",
            )
            .bind(("patch", DbRunPatch::from(transition)))
            .bind(("id", run_id.to_string()))
            .bind(("expected", expected.as_str()))
            .await?;
        let rows: Vec<DbRun> = response.take(0)?;
        if let Some(row) = first(rows) {
            return Ok(row.into());
        }

        match self.get_run(run_id).await? {
            None => Err(StorageError::NotFound {
                entity: "pipeline_run",
                id: run_id.to_string(),
            }),
            Some(current) => Err(StorageError::StatusConflict {
                entity: "pipeline_run",
                id: run_id.to_string(),
                current: current.status.to_string(),
                expected: expected.to_string(),
            }),
        }
    }

    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: usize,
    ) -> StorageResult<Vec<RunRecord>> {
        let limit = limit_clause(limit);
        let rows: Vec<DbRun> = match status {
            Some(status) => {
                self.select(
                    &format!(
                        "SELECT * FROM pipeline_runs WHERE status = $status \
                         ORDER BY created_at DESC{limit}"
                    ),
                    vec![("status", status.as_str().into())],
                )
                .await?
            }
            None => {
                self.select(
                    &format!("SELECT * FROM pipeline_runs ORDER BY created_at DESC{limit}"),
                    vec![],
                )
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ReviewStore for SurrealStore {
    async fn insert_review(&self, review: ReviewRecord) -> StorageResult<ReviewRecord> {
        let created = self.create("reviews", DbReview::from(review)).await?;
        Ok(created.into())
    }

    async fn get_review(&self, review_id: &str) -> StorageResult<Option<ReviewRecord>> {
        let rows: Vec<DbReview> = self
            .select(
                "SELECT * FROM reviews WHERE review_id = $id",
                vec![("id", review_id.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    async fn decide_review(
        &self,
        review_id: &str,
        state: ReviewState,
        notes: &str,
        decided_at: DateTime<Utc>,
    ) -> StorageResult<ReviewRecord> {
        let mut response = self
            .handle
            .db()
            .query(
                "UPDATE reviews SET state = $state, notes = $notes, decided_at = $decided_at \
                 WHERE review_id = $id AND state = 'pending' RETURN AFTER",
            )
            .bind(("state", state.as_str()))
            .bind(("notes", notes.to_string()))
            .bind(("decided_at", SurrealDatetime::from(decided_at)))
            .bind(("id", review_id.to_string()))
            .await?;
        let rows: Vec<DbReview> = response.take(0)?;
        if let Some(row) = first(rows) {
            return Ok(row.into());
        }

        match self.get_review(review_id).await? {
            None => Err(StorageError::NotFound {
                entity: "review",
                id: review_id.to_string(),
            }),
            Some(current) => Err(StorageError::StatusConflict {
                entity: "review",
                id: review_id.to_string(),
                current: current.state.to_string(),
                expected: ReviewState::Pending.to_string(),
            }),
        }
    }

    async fn list_reviews(&self, state: Option<ReviewState>) -> StorageResult<Vec<ReviewRecord>> {
        let rows: Vec<DbReview> = match state {
            Some(state) => {
                self.select(
                    "SELECT * FROM reviews WHERE state = $state ORDER BY created_at ASC",
                    vec![("state", state.as_str().into())],
                )
                .await?
            }
            None => {
                self.select("SELECT * FROM reviews ORDER BY created_at ASC", vec![])
                    .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl CandidateStore for SurrealStore {
    async fn insert_candidate(&self, candidate: CandidateRecord) -> StorageResult<CandidateRecord> {
        let created = self
            .create("paper_candidates", DbCandidate::from(candidate))
            .await?;
        Ok(created.into())
    }

    async fn get_candidate(&self, candidate_id: &str) -> StorageResult<Option<CandidateRecord>> {
        let rows: Vec<DbCandidate> = self
            .select(
                "SELECT * FROM paper_candidates WHERE candidate_id = $id",
                vec![("id", candidate_id.into())],
            )
            .await?;
        Ok(first(rows).map(Into::into))
    }

    async fn set_candidate_status(
        &self,
        candidate_id: &str,
        expected: &[CandidateStatus],
        next: CandidateStatus,
    ) -> StorageResult<CandidateRecord> {
        let allowed: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let mut response = self
            .handle
            .db()
            .query(
                "UPDATE paper_candidates SET status = $next \
                 WHERE candidate_id = $id AND status INSIDE $allowed RETURN AFTER",
            )
            .bind(("next", next.as_str()))
            .bind(("id", candidate_id.to_string()))
            .bind(("allowed", allowed.clone()))
            .await?;
        let rows: Vec<DbCandidate> = response.take(0)?;
        if let Some(row) = first(rows) {
            return Ok(row.into());
        }

        match self.get_candidate(candidate_id).await? {
            None => Err(StorageError::NotFound {
                entity: "paper_candidate",
                id: candidate_id.to_string(),
            }),
            Some(current) => Err(StorageError::StatusConflict {
                entity: "paper_candidate",
                id: candidate_id.to_string(),
                current: current.status.to_string(),
                expected: allowed.join("|"),
            }),
        }
    }

    async fn list_candidates(
        &self,
        status: Option<CandidateStatus>,
    ) -> StorageResult<Vec<CandidateRecord>> {
        let rows: Vec<DbCandidate> = match status {
            Some(status) => {
                self.select(
                    "SELECT * FROM paper_candidates WHERE status = $status \
                     ORDER BY created_at DESC",
                    vec![("status", status.as_str().into())],
                )
                .await?
            }
            None => {
                self.select(
                    "SELECT * FROM paper_candidates ORDER BY created_at DESC",
                    vec![],
                )
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_limits_are_omitted() {
        assert_eq!(limit_clause(10), " LIMIT 10");
        assert_eq!(limit_clause(usize::MAX), "");
    }
}
