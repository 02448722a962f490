//! Trait contract tests for BlockStore, RunStore, ReviewStore and CandidateStore.
//!
//! Every contract runs against the in-memory fakes and against SurrealDB
//! (`mem://`). Any conforming implementation must pass these.

use std::sync::Arc;

use blockbench_state::fakes::{
    MemoryBlockStore, MemoryCandidateStore, MemoryReviewStore, MemoryRunStore,
};
use blockbench_state::*;
use chrono::{Duration, Utc};
use serde_json::json;

async fn surreal() -> SurrealStore {
    let handle = SurrealHandle::setup_db().await.unwrap();
    SurrealStore::new(Arc::new(handle))
}

fn version_of(block: &BlockRecord, version: &str, status: VersionStatus) -> BlockVersionRecord {
    BlockVersionRecord {
        version_id: new_record_id(),
        block_id: block.block_id.clone(),
        version: version.to_string(),
        status,
        digest: "0123456789abcdef".to_string(),
        input_schema: json!({"type": "object", "properties": {"seed": {"type": "integer"}}}),
        output_schema: json!({"type": "object"}),
        changelog: String::new(),
        permissions: BlockPermissions::default(),
        tests: BlockTests::default(),
        created_at: Utc::now(),
        published_at: None,
    }
}

fn queued_run() -> RunRecord {
    RunRecord {
        run_id: new_record_id(),
        pipeline_id: Some("p1".to_string()),
        status: RunStatus::Queued,
        spec: json!({"specVersion": "1.0"}),
        locked_blocks: json!([]),
        runtime_env: json!({"seed": 42}),
        metrics: None,
        error: None,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
    }
}

// ===========================================================================
// BlockStore contracts
// ===========================================================================

async fn block_slug_is_unique(store: &dyn BlockStore) {
    let block = BlockRecord::new("fusions.concat", BlockCategory::Fusion, "Concat", "");
    store.insert_block(block).await.unwrap();

    let dup = BlockRecord::new("fusions.concat", BlockCategory::Fusion, "Again", "");
    let err = store.insert_block(dup).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { entity: "block", .. }));
}

async fn block_lookup_and_display_update(store: &dyn BlockStore) {
    let block = BlockRecord::new("unimodals.linear", BlockCategory::UnimodalEncoder, "Linear", "");
    let stored = store.insert_block(block.clone()).await.unwrap();

    let by_id = store.get_block(&stored.block_id).await.unwrap().unwrap();
    assert_eq!(by_id.slug, "unimodals.linear");
    assert_eq!(by_id.category, BlockCategory::UnimodalEncoder);

    let updated = store
        .update_block_display("unimodals.linear", "Linear Encoder", "Dense projection")
        .await
        .unwrap();
    assert_eq!(updated.block_id, stored.block_id);
    assert_eq!(updated.display_name, "Linear Encoder");
    assert_eq!(updated.description, "Dense projection");

    assert!(store.get_block_by_slug("missing").await.unwrap().is_none());
    let err = store
        .update_block_display("missing", "x", "y")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

async fn version_pair_is_unique(store: &dyn BlockStore) {
    let block = store
        .insert_block(BlockRecord::new("datasets.toy_av", BlockCategory::Dataset, "Toy", ""))
        .await
        .unwrap();
    store
        .insert_version(version_of(&block, "1.0.0", VersionStatus::Draft))
        .await
        .unwrap();
    let err = store
        .insert_version(version_of(&block, "1.0.0", VersionStatus::Draft))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { entity: "block_version", .. }));

    let found = store.find_version(&block.block_id, "1.0.0").await.unwrap();
    assert!(found.is_some());
    assert!(store
        .find_version(&block.block_id, "9.9.9")
        .await
        .unwrap()
        .is_none());
}

async fn version_status_is_compare_and_set(store: &dyn BlockStore) {
    let block = store
        .insert_block(BlockRecord::new("eval_scripts.basic", BlockCategory::Evaluator, "Eval", ""))
        .await
        .unwrap();
    let v = store
        .insert_version(version_of(&block, "1.0.0", VersionStatus::Approved))
        .await
        .unwrap();

    let stamp = Utc::now();
    let published = store
        .set_version_status(
            &v.version_id,
            VersionStatus::Approved,
            VersionStatus::Published,
            Some(stamp),
        )
        .await
        .unwrap();
    assert_eq!(published.status, VersionStatus::Published);
    assert!(published.published_at.is_some());
    assert_eq!(published.digest, v.digest);

    // A second writer still expecting Approved loses.
    let err = store
        .set_version_status(
            &v.version_id,
            VersionStatus::Approved,
            VersionStatus::Published,
            Some(Utc::now()),
        )
        .await
        .unwrap_err();
    match err {
        StorageError::StatusConflict { current, .. } => assert_eq!(current, "published"),
        other => panic!("expected StatusConflict, got {other:?}"),
    }

    let err = store
        .set_version_status("nope", VersionStatus::Draft, VersionStatus::PendingReview, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

async fn versions_filter_by_status(store: &dyn BlockStore) {
    let block = store
        .insert_block(BlockRecord::new("fusions.sum", BlockCategory::Fusion, "Sum", ""))
        .await
        .unwrap();
    store
        .insert_version(version_of(&block, "1.0.0", VersionStatus::Published))
        .await
        .unwrap();
    store
        .insert_version(version_of(&block, "1.1.0", VersionStatus::Draft))
        .await
        .unwrap();

    let all = store.list_versions(&block.block_id, None).await.unwrap();
    assert_eq!(all.len(), 2);
    let published = store
        .list_versions(&block.block_id, Some(VersionStatus::Published))
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].version, "1.0.0");
    assert_eq!(published[0].permissions, BlockPermissions::default());
    assert!(published[0].tests.smoke);
}

async fn all_block_contracts(store: &dyn BlockStore) {
    block_slug_is_unique(store).await;
    block_lookup_and_display_update(store).await;
    version_pair_is_unique(store).await;
    version_status_is_compare_and_set(store).await;
    versions_filter_by_status(store).await;
    assert_eq!(store.list_blocks().await.unwrap().len(), 5);
}

#[tokio::test]
async fn memory_block_store_contracts() {
    all_block_contracts(&MemoryBlockStore::new()).await;
}

#[tokio::test]
async fn surreal_block_store_contracts() {
    all_block_contracts(&surreal().await).await;
}

// ===========================================================================
// RunStore contracts
// ===========================================================================

async fn run_lifecycle(store: &dyn RunStore) {
    let run = store.insert_run(queued_run()).await.unwrap();
    let started = Utc::now();

    let running = store
        .transition_run(
            &run.run_id,
            RunStatus::Queued,
            RunTransition {
                status: RunStatus::Running,
                started_at: Some(started),
                finished_at: None,
                metrics: None,
                error: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(running.status, RunStatus::Running);
    assert!(running.started_at.is_some());

    // Two claimers: only the first one wins.
    let err = store
        .transition_run(
            &run.run_id,
            RunStatus::Queued,
            RunTransition {
                status: RunStatus::Running,
                started_at: Some(Utc::now()),
                finished_at: None,
                metrics: None,
                error: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StatusConflict { .. }));

    let done = store
        .transition_run(
            &run.run_id,
            RunStatus::Running,
            RunTransition {
                status: RunStatus::Succeeded,
                started_at: None,
                finished_at: Some(started + Duration::milliseconds(5)),
                metrics: Some(json!({"performance": {"accuracy": 0.9}})),
                error: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, RunStatus::Succeeded);
    assert!(done.started_at.is_some());
    assert!(done.finished_at.unwrap() >= done.started_at.unwrap());
    assert_eq!(done.metrics.unwrap()["performance"]["accuracy"], json!(0.9));
    assert_eq!(done.spec, json!({"specVersion": "1.0"}));

    let fetched = store.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Succeeded);
}

async fn run_listing(store: &dyn RunStore) {
    let first = store.insert_run(queued_run()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = store.insert_run(queued_run()).await.unwrap();

    let queued = store.list_runs(Some(RunStatus::Queued), 10).await.unwrap();
    let ids: Vec<_> = queued.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec![second.run_id.as_str(), first.run_id.as_str()]);

    let limited = store.list_runs(None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);

    // unbounded scans, as the daemon does
    let all_queued = store.list_runs(Some(RunStatus::Queued), usize::MAX).await.unwrap();
    assert_eq!(all_queued, queued);
    assert!(store.list_runs(None, usize::MAX).await.unwrap().len() >= 2);

    assert!(store.get_run("missing").await.unwrap().is_none());
    let err = store
        .transition_run(
            "missing",
            RunStatus::Queued,
            RunTransition {
                status: RunStatus::Running,
                started_at: None,
                finished_at: None,
                metrics: None,
                error: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn memory_run_store_contracts() {
    let store = MemoryRunStore::new();
    run_lifecycle(&store).await;
    run_listing(&store).await;
}

#[tokio::test]
async fn surreal_run_store_contracts() {
    let store = surreal().await;
    run_lifecycle(&store).await;
    run_listing(&store).await;
}

// ===========================================================================
// ReviewStore / CandidateStore contracts
// ===========================================================================

async fn review_decided_once(store: &dyn ReviewStore) {
    let review = store
        .insert_review(ReviewRecord::pending(
            ReviewTargetType::BlockVersion,
            "v-1",
            "alice",
        ))
        .await
        .unwrap();

    let decided = store
        .decide_review(&review.review_id, ReviewState::Approved, "lgtm", Utc::now())
        .await
        .unwrap();
    assert_eq!(decided.state, ReviewState::Approved);
    assert_eq!(decided.notes, "lgtm");
    assert!(decided.decided_at.is_some());

    let err = store
        .decide_review(&review.review_id, ReviewState::Rejected, "", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StatusConflict { .. }));

    assert!(store
        .list_reviews(Some(ReviewState::Pending))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.list_reviews(None).await.unwrap().len(), 1);
}

async fn candidate_status_guard(store: &dyn CandidateStore) {
    let candidate = store
        .insert_candidate(CandidateRecord {
            candidate_id: new_record_id(),
            paper: PaperRef {
                source: "arxiv".to_string(),
                external_id: "2107.07502".to_string(),
                title: "MultiBench".to_string(),
                url: "https://arxiv.org/abs/2107.07502".to_string(),
            },
            status: CandidateStatus::PendingReview,
            proposed_blocks: json!([{"slug": "fusions.tensor", "category": "fusions"}]),
            proposal_text: "free text, kept as-is".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let approved = store
        .set_candidate_status(
            &candidate.candidate_id,
            &[CandidateStatus::Draft, CandidateStatus::PendingReview],
            CandidateStatus::Approved,
        )
        .await
        .unwrap();
    assert_eq!(approved.status, CandidateStatus::Approved);
    assert_eq!(approved.proposal_text, "free text, kept as-is");

    let err = store
        .set_candidate_status(
            &candidate.candidate_id,
            &[CandidateStatus::Draft, CandidateStatus::PendingReview],
            CandidateStatus::Rejected,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StatusConflict { .. }));

    let listed = store
        .list_candidates(Some(CandidateStatus::Approved))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].proposed_blocks[0]["slug"], "fusions.tensor");
}

#[tokio::test]
async fn memory_review_and_candidate_contracts() {
    review_decided_once(&MemoryReviewStore::new()).await;
    candidate_status_guard(&MemoryCandidateStore::new()).await;
}

#[tokio::test]
async fn surreal_review_and_candidate_contracts() {
    let store = surreal().await;
    review_decided_once(&store).await;
    candidate_status_guard(&store).await;
}
