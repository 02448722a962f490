//! Registry, digest and review lifecycle behaviour through the public API.

mod common;

use blockbench_core::domain::compute_block_digest;
use blockbench_core::{BenchError, BlockCategory, Caller, ErrorKind, VersionDraft, VersionStatus};
use serde_json::json;

#[test]
fn digest_is_deterministic_and_sensitive() {
    let input = json!({"type": "object", "properties": {"outDim": {"type": "integer"}}});
    let output = json!({"type": "object"});

    let a = compute_block_digest("unimodals.linear", "1.0.0", &input, &output).unwrap();
    let b = compute_block_digest("unimodals.linear", "1.0.0", &input, &output).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

    let renamed = json!({"type": "object", "properties": {"outDims": {"type": "integer"}}});
    assert_ne!(a, compute_block_digest("unimodals.linear", "1.0.0", &renamed, &output).unwrap());
    assert_ne!(a, compute_block_digest("unimodals.linear", "1.0.1", &input, &output).unwrap());
    assert_ne!(a, compute_block_digest("unimodals.linea", "1.0.0", &input, &output).unwrap());
}

#[tokio::test]
async fn duplicate_version_is_rejected_and_digest_kept() {
    let bench = common::bench().await;
    let sys = Caller::system();
    let before = bench
        .registry
        .find_version("fusions.concat", "1.0.0")
        .await
        .unwrap()
        .unwrap();

    let err = bench
        .registry
        .publish_version(
            &sys,
            "fusions.concat",
            VersionDraft::new("1.0.0", json!({"type": "string"}), json!({})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::DuplicateVersion { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let after = bench
        .registry
        .find_version("fusions.concat", "1.0.0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.digest, after.digest);
}

#[tokio::test]
async fn latest_published_uses_semantic_order() {
    let bench = common::bench().await;
    let sys = Caller::system();
    for version in ["1.9.0", "1.10.0", "1.2.0"] {
        bench
            .registry
            .publish_version(&sys, "fusions.sum", VersionDraft::new(version, json!({}), json!({})))
            .await
            .unwrap();
    }
    let latest = bench.registry.latest_published("fusions.sum").await.unwrap().unwrap();
    assert_eq!(latest.version, "1.10.0");

    bench.reviews.deprecate(&sys, &latest.version_id).await.unwrap();
    let latest = bench.registry.latest_published("fusions.sum").await.unwrap().unwrap();
    assert_eq!(latest.version, "1.9.0");
}

#[tokio::test]
async fn contributor_version_walks_the_state_machine() {
    let bench = common::bench().await;
    let sys = Caller::system();
    let draft = bench
        .registry
        .create_draft_version(
            &sys,
            "unimodals.identity",
            VersionDraft::new("2.0.0", json!({"type": "object"}), json!({})).with_changelog("scale only"),
        )
        .await
        .unwrap();
    assert_eq!(draft.status, VersionStatus::Draft);

    let (review, _) = bench.reviews.submit_for_review(&sys, &draft.version_id).await.unwrap();
    bench.reviews.approve(&sys, &review.review_id, "ok").await.unwrap();
    let published = bench.reviews.publish(&sys, &draft.version_id).await.unwrap();
    assert_eq!(published.status, VersionStatus::Published);
    assert_eq!(published.digest, draft.digest);

    // terminal states never return to draft
    let err = bench
        .registry
        .transition(&sys, &draft.version_id, blockbench_core::domain::VersionEvent::Submit)
        .await
        .unwrap_err();
    match err {
        BenchError::IllegalTransition { current, attempted, .. } => {
            assert_eq!(current, "published");
            assert_eq!(attempted, "submit");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn anonymous_callers_cannot_mutate() {
    let bench = common::bench().await;
    let anon = Caller::from_key(Some("guess"), Some("real-key"));

    let err = bench
        .registry
        .register_or_update_block(&anon, "fusions.max", BlockCategory::Fusion, "Max", "")
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Forbidden(_)));

    let v = bench
        .registry
        .find_version("fusions.sum", "1.0.0")
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        bench.reviews.deprecate(&anon, &v.version_id).await.unwrap_err(),
        BenchError::Forbidden(_)
    ));

    // reads stay open
    assert_eq!(bench.registry.list_blocks().await.unwrap().len(), 8);
}

#[tokio::test]
async fn category_is_part_of_identity() {
    let bench = common::bench().await;
    let err = bench
        .registry
        .register_or_update_block(&Caller::system(), "fusions.concat", BlockCategory::Evaluator, "x", "")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);

    let refreshed = bench
        .registry
        .register_or_update_block(
            &Caller::system(),
            "fusions.concat",
            BlockCategory::Fusion,
            "Concat",
            "Concatenate along features.",
        )
        .await
        .unwrap();
    assert_eq!(refreshed.display_name, "Concat");
}
