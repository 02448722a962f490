//! Structured observability hooks for BlockBench lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via [`run_span`]
//! - Emission functions for run submission, start, finish, lock and version transitions
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, set `BLOCKBENCH_LOG_FORMAT=json`.

use tracing::info;

/// Span tagged with the run id. Attach it to async work with
/// [`tracing::Instrument`] so it stays `Send`.
///
/// # Example
///
/// ```ignore
/// async { /* ... */ }.instrument(run_span("run-12345")).await;
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("blockbench.run", run_id = %run_id)
}

/// Emit event: a run was accepted and persisted.
pub fn emit_run_submitted(run_id: &str, mode: &str, locked_blocks: usize) {
    info!(
        event = "run.submitted",
        run_id = %run_id,
        mode = %mode,
        locked_blocks = locked_blocks,
    );
}

/// Emit event: run moved to `running`.
pub fn emit_run_started(run_id: &str, seed: u64) {
    info!(event = "run.started", run_id = %run_id, seed = seed);
}

/// Emit event: run reached a terminal state.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a spec passed verification and produced a manifest.
pub fn emit_pipeline_locked(pipeline_id: &str, locked_blocks: usize) {
    info!(
        event = "pipeline.locked",
        pipeline_id = %pipeline_id,
        locked_blocks = locked_blocks,
    );
}

/// Emit event: a block version moved along its state machine.
pub fn emit_version_transitioned(version_id: &str, from: &str, to: &str, actor: &str) {
    info!(
        event = "block_version.transitioned",
        version_id = %version_id,
        from = %from,
        to = %to,
        actor = %actor,
    );
}

/// Emit event: run finalization error (warning level).
pub fn emit_run_finalize_error(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.finalize_error", run_id = %run_id, error = %error);
}
