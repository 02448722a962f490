//! Human review workflow over block versions and paper candidates.
//!
//! A review is opened when its target enters `pending_review` and decided
//! exactly once. Deciding a review drives its target along the target's own
//! state machine.

use std::sync::Arc;

use blockbench_state::{
    BlockVersionRecord, CandidateStatus, CandidateStore, ReviewRecord, ReviewState, ReviewStore,
    ReviewTargetType, StorageError,
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::access::Caller;
use crate::domain::error::{BenchError, Result};
use crate::domain::lifecycle::VersionEvent;
use crate::registry::BlockRegistry;

fn conflict(entity: &'static str, id: &str, attempted: &str, e: StorageError) -> BenchError {
    match e {
        StorageError::StatusConflict { current, .. } => BenchError::IllegalTransition {
            entity,
            id: id.to_string(),
            current,
            attempted: attempted.to_string(),
        },
        StorageError::NotFound { .. } => BenchError::not_found(entity, id),
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct ReviewWorkflow {
    registry: BlockRegistry,
    reviews: Arc<dyn ReviewStore>,
    candidates: Arc<dyn CandidateStore>,
}

impl ReviewWorkflow {
    pub fn new(
        registry: BlockRegistry,
        reviews: Arc<dyn ReviewStore>,
        candidates: Arc<dyn CandidateStore>,
    ) -> Self {
        Self {
            registry,
            reviews,
            candidates,
        }
    }

    /// Move a draft version to `pending_review` and open a review for it.
    ///
    /// If the review cannot be stored the version goes back to `draft`.
    #[instrument(skip(self, caller))]
    pub async fn submit_for_review(
        &self,
        caller: &Caller,
        version_id: &str,
    ) -> Result<(ReviewRecord, BlockVersionRecord)> {
        let version = self
            .registry
            .transition(caller, version_id, VersionEvent::Submit)
            .await?;
        let opened = self
            .reviews
            .insert_review(ReviewRecord::pending(
                ReviewTargetType::BlockVersion,
                version_id,
                caller.principal(),
            ))
            .await;
        let review = match opened {
            Ok(review) => review,
            Err(e) => {
                if let Err(undo) = self
                    .registry
                    .transition(caller, version_id, VersionEvent::Reject)
                    .await
                {
                    warn!(%version_id, error = %undo, "failed to return version to draft");
                }
                return Err(e.into());
            }
        };
        info!(review_id = %review.review_id, "review opened");
        Ok((review, version))
    }

    /// Move a draft candidate to `pending_review` and open a review for it.
    #[instrument(skip(self, caller))]
    pub async fn submit_candidate_for_review(
        &self,
        caller: &Caller,
        candidate_id: &str,
    ) -> Result<ReviewRecord> {
        caller.require_privileged("submit candidate")?;
        self.candidates
            .set_candidate_status(
                candidate_id,
                &[CandidateStatus::Draft],
                CandidateStatus::PendingReview,
            )
            .await
            .map_err(|e| conflict("paper_candidate", candidate_id, "submit", e))?;
        let opened = self
            .reviews
            .insert_review(ReviewRecord::pending(
                ReviewTargetType::PaperCandidate,
                candidate_id,
                caller.principal(),
            ))
            .await;
        if opened.is_err() {
            let undo = self
                .candidates
                .set_candidate_status(
                    candidate_id,
                    &[CandidateStatus::PendingReview],
                    CandidateStatus::Draft,
                )
                .await;
            if let Err(undo) = undo {
                warn!(%candidate_id, error = %undo, "failed to return candidate to draft");
            }
        }
        Ok(opened?)
    }

    pub async fn approve(&self, caller: &Caller, review_id: &str, notes: &str) -> Result<ReviewRecord> {
        self.decide(caller, review_id, ReviewState::Approved, notes).await
    }

    pub async fn reject(&self, caller: &Caller, review_id: &str, notes: &str) -> Result<ReviewRecord> {
        self.decide(caller, review_id, ReviewState::Rejected, notes).await
    }

    #[instrument(skip(self, caller, notes))]
    async fn decide(
        &self,
        caller: &Caller,
        review_id: &str,
        state: ReviewState,
        notes: &str,
    ) -> Result<ReviewRecord> {
        caller.require_privileged("decide review")?;
        let attempted = match state {
            ReviewState::Approved => "approve",
            _ => "reject",
        };

        let review = self
            .reviews
            .get_review(review_id)
            .await?
            .ok_or_else(|| BenchError::not_found("review", review_id))?;
        if review.state != ReviewState::Pending {
            return Err(BenchError::IllegalTransition {
                entity: "review",
                id: review_id.to_string(),
                current: review.state.to_string(),
                attempted: attempted.to_string(),
            });
        }

        match review.target_type {
            ReviewTargetType::BlockVersion => {
                let event = if state == ReviewState::Approved {
                    VersionEvent::Approve
                } else {
                    VersionEvent::Reject
                };
                self.registry
                    .transition(caller, &review.target_id, event)
                    .await?;
            }
            ReviewTargetType::PaperCandidate => {
                let next = if state == ReviewState::Approved {
                    CandidateStatus::Approved
                } else {
                    CandidateStatus::Rejected
                };
                self.candidates
                    .set_candidate_status(&review.target_id, &[CandidateStatus::PendingReview], next)
                    .await
                    .map_err(|e| conflict("paper_candidate", &review.target_id, attempted, e))?;
            }
        }

        let decided = self
            .reviews
            .decide_review(review_id, state, notes, Utc::now())
            .await
            .map_err(|e| conflict("review", review_id, attempted, e))?;
        info!(target_id = %decided.target_id, state = %decided.state, "review decided");
        Ok(decided)
    }

    /// `approved → published`, stamping `published_at`.
    pub async fn publish(&self, caller: &Caller, version_id: &str) -> Result<BlockVersionRecord> {
        self.registry
            .transition(caller, version_id, VersionEvent::Publish)
            .await
    }

    /// `published → deprecated`. Deprecated versions stay lockable.
    pub async fn deprecate(&self, caller: &Caller, version_id: &str) -> Result<BlockVersionRecord> {
        self.registry
            .transition(caller, version_id, VersionEvent::Deprecate)
            .await
    }

    pub async fn list_reviews(&self, state: Option<ReviewState>) -> Result<Vec<ReviewRecord>> {
        Ok(self.reviews.list_reviews(state).await?)
    }

    pub async fn get_review(&self, review_id: &str) -> Result<ReviewRecord> {
        self.reviews
            .get_review(review_id)
            .await?
            .ok_or_else(|| BenchError::not_found("review", review_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VersionDraft;
    use blockbench_state::fakes::{MemoryBlockStore, MemoryCandidateStore, MemoryReviewStore};
    use blockbench_state::{BlockCategory, VersionStatus};
    use serde_json::json;

    async fn setup() -> (ReviewWorkflow, BlockRegistry, String) {
        let registry = BlockRegistry::new(Arc::new(MemoryBlockStore::new()));
        let sys = Caller::system();
        registry
            .register_or_update_block(&sys, "fusions.sum", BlockCategory::Fusion, "Sum", "")
            .await
            .unwrap();
        let v = registry
            .create_draft_version(&sys, "fusions.sum", VersionDraft::new("2.0.0", json!({}), json!({})))
            .await
            .unwrap();
        let wf = ReviewWorkflow::new(
            registry.clone(),
            Arc::new(MemoryReviewStore::new()),
            Arc::new(MemoryCandidateStore::new()),
        );
        (wf, registry, v.version_id)
    }

    #[tokio::test]
    async fn approve_then_publish() {
        let (wf, registry, version_id) = setup().await;
        let sys = Caller::system();
        let (review, version) = wf.submit_for_review(&sys, &version_id).await.unwrap();
        assert_eq!(version.status, VersionStatus::PendingReview);
        assert_eq!(review.state, ReviewState::Pending);

        let decided = wf.approve(&sys, &review.review_id, "lgtm").await.unwrap();
        assert_eq!(decided.state, ReviewState::Approved);
        assert_eq!(decided.notes, "lgtm");
        assert!(decided.decided_at.is_some());

        let published = wf.publish(&sys, &version_id).await.unwrap();
        assert_eq!(published.status, VersionStatus::Published);
        assert!(published.published_at.is_some());

        wf.deprecate(&sys, &version_id).await.unwrap();
        assert_eq!(
            registry.get_version(&version_id).await.unwrap().status,
            VersionStatus::Deprecated
        );
    }

    #[tokio::test]
    async fn reject_returns_to_draft_and_review_is_decided_once() {
        let (wf, registry, version_id) = setup().await;
        let sys = Caller::system();
        let (review, _) = wf.submit_for_review(&sys, &version_id).await.unwrap();
        wf.reject(&sys, &review.review_id, "needs tests").await.unwrap();
        assert_eq!(
            registry.get_version(&version_id).await.unwrap().status,
            VersionStatus::Draft
        );

        let err = wf.approve(&sys, &review.review_id, "").await.unwrap_err();
        match err {
            BenchError::IllegalTransition { entity, current, .. } => {
                assert_eq!(entity, "review");
                assert_eq!(current, "rejected");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_requires_approval() {
        let (wf, _, version_id) = setup().await;
        let err = wf.publish(&Caller::system(), &version_id).await.unwrap_err();
        assert!(matches!(err, BenchError::IllegalTransition { .. }));
        assert!(wf.list_reviews(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn candidate_review_drives_candidate_status() {
        let registry = BlockRegistry::new(Arc::new(MemoryBlockStore::new()));
        let candidates = Arc::new(MemoryCandidateStore::new());
        let wf = ReviewWorkflow::new(registry, Arc::new(MemoryReviewStore::new()), candidates.clone());
        let candidate = candidates
            .insert_candidate(blockbench_state::CandidateRecord {
                candidate_id: blockbench_state::new_record_id(),
                paper: blockbench_state::PaperRef {
                    source: "arxiv".to_string(),
                    external_id: "2401.00001".to_string(),
                    title: "Late fusion".to_string(),
                    url: String::new(),
                },
                status: CandidateStatus::Draft,
                proposed_blocks: json!([]),
                proposal_text: String::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let sys = Caller::system();
        assert!(matches!(
            wf.submit_candidate_for_review(&Caller::Anonymous, &candidate.candidate_id)
                .await
                .unwrap_err(),
            BenchError::Forbidden(_)
        ));
        let review = wf
            .submit_candidate_for_review(&sys, &candidate.candidate_id)
            .await
            .unwrap();
        assert_eq!(review.target_type, ReviewTargetType::PaperCandidate);

        wf.approve(&sys, &review.review_id, "").await.unwrap();
        let stored = candidates.get_candidate(&candidate.candidate_id).await.unwrap().unwrap();
        assert_eq!(stored.status, CandidateStatus::Approved);

        // already out of draft
        let err = wf
            .submit_candidate_for_review(&sys, &candidate.candidate_id)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::IllegalTransition { .. }));
    }

    struct UnwritableReviews;

    #[async_trait::async_trait]
    impl ReviewStore for UnwritableReviews {
        async fn insert_review(&self, _: ReviewRecord) -> blockbench_state::StorageResult<ReviewRecord> {
            Err(StorageError::Backend("reviews offline".to_string()))
        }

        async fn get_review(&self, _: &str) -> blockbench_state::StorageResult<Option<ReviewRecord>> {
            Ok(None)
        }

        async fn decide_review(
            &self,
            review_id: &str,
            _: ReviewState,
            _: &str,
            _: chrono::DateTime<Utc>,
        ) -> blockbench_state::StorageResult<ReviewRecord> {
            Err(StorageError::NotFound {
                entity: "review",
                id: review_id.to_string(),
            })
        }

        async fn list_reviews(
            &self,
            _: Option<ReviewState>,
        ) -> blockbench_state::StorageResult<Vec<ReviewRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_review_insert_leaves_version_in_draft() {
        let (_, registry, version_id) = setup().await;
        let wf = ReviewWorkflow::new(
            registry.clone(),
            Arc::new(UnwritableReviews),
            Arc::new(MemoryCandidateStore::new()),
        );
        let sys = Caller::system();

        let err = wf.submit_for_review(&sys, &version_id).await.unwrap_err();
        assert!(matches!(err, BenchError::Storage(StorageError::Backend(_))));
        assert_eq!(
            registry.get_version(&version_id).await.unwrap().status,
            VersionStatus::Draft
        );
    }
}
