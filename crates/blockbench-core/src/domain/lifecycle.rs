//! Block version and run state machines.
//!
//! Legal version edges:
//!
//! ```text
//! draft --submit--> pending_review --approve--> approved --publish--> published --deprecate--> deprecated
//!                   pending_review --reject---> draft
//! ```
//!
//! Runs: `queued → running → {succeeded, failed}`. Every other pair is an
//! `IllegalTransition`.

use blockbench_state::{RunStatus, VersionStatus};
use serde::{Deserialize, Serialize};

use crate::domain::error::{BenchError, Result};

/// An event applied to a block version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionEvent {
    Submit,
    Approve,
    Reject,
    Publish,
    Deprecate,
}

impl VersionEvent {
    pub const ALL: [VersionEvent; 5] = [
        VersionEvent::Submit,
        VersionEvent::Approve,
        VersionEvent::Reject,
        VersionEvent::Publish,
        VersionEvent::Deprecate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionEvent::Submit => "submit",
            VersionEvent::Approve => "approve",
            VersionEvent::Reject => "reject",
            VersionEvent::Publish => "publish",
            VersionEvent::Deprecate => "deprecate",
        }
    }
}

impl std::fmt::Display for VersionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status a version moves to when `event` is applied in `current`, if legal.
pub fn next_version_status(current: VersionStatus, event: VersionEvent) -> Option<VersionStatus> {
    use VersionEvent::*;
    use VersionStatus::*;
    match (current, event) {
        (Draft, Submit) => Some(PendingReview),
        (PendingReview, Approve) => Some(Approved),
        (PendingReview, Reject) => Some(Draft),
        (Approved, Publish) => Some(Published),
        (Published, Deprecate) => Some(Deprecated),
        _ => None,
    }
}

/// Like [`next_version_status`] but reports an `IllegalTransition`.
pub fn apply_version_event(
    version_id: &str,
    current: VersionStatus,
    event: VersionEvent,
) -> Result<VersionStatus> {
    next_version_status(current, event).ok_or_else(|| BenchError::IllegalTransition {
        entity: "block_version",
        id: version_id.to_string(),
        current: current.to_string(),
        attempted: event.to_string(),
    })
}

/// Check a run status edge.
pub fn check_run_transition(run_id: &str, current: RunStatus, next: RunStatus) -> Result<()> {
    use RunStatus::*;
    let legal = matches!(
        (current, next),
        (Queued, Running) | (Running, Succeeded) | (Running, Failed)
    );
    if legal {
        Ok(())
    } else {
        Err(BenchError::IllegalTransition {
            entity: "pipeline_run",
            id: run_id.to_string(),
            current: current.to_string(),
            attempted: next.to_string(),
        })
    }
}
