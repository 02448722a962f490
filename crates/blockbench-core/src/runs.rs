//! Run lifecycle manager.
//!
//! Owns every write to a run record. Transitions are compare-and-set against
//! the stored status, so a run is claimed by at most one worker and readers
//! only ever see whole records.

use std::sync::Arc;
use std::time::Instant;

use blockbench_state::{new_record_id, RunRecord, RunStatus, RunStore, RunTransition, StorageError};
use chrono::Utc;
use tracing::{instrument, warn, Instrument};

use crate::domain::error::{BenchError, ComputationError, Result};
use crate::domain::lifecycle::check_run_transition;
use crate::domain::pipeline::{PipelineSpec, RunMode};
use crate::domain::run::{MetricsReport, RuntimeEnv};
use crate::engine::executor::ExecutionEngine;
use crate::locker::PipelineLocker;
use crate::metrics::METRICS;
use crate::obs::{
    emit_run_finalize_error, emit_run_finished, emit_run_started, emit_run_submitted, run_span,
};
use crate::worker::RunQueue;

pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Terminal result of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded(MetricsReport),
    Failed(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }
}

#[derive(Clone)]
pub struct RunManager {
    runs: Arc<dyn RunStore>,
    locker: PipelineLocker,
    engine: ExecutionEngine,
    queue: Option<Arc<dyn RunQueue>>,
}

impl RunManager {
    pub fn new(runs: Arc<dyn RunStore>, locker: PipelineLocker, engine: ExecutionEngine) -> Self {
        Self {
            runs,
            locker,
            engine,
            queue: None,
        }
    }

    /// Attach the queue that async submissions are handed to.
    pub fn with_queue(mut self, queue: Arc<dyn RunQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Validate, lock and persist a run.
    ///
    /// Sync runs execute inside this call and come back terminal. Async runs
    /// come back `queued`. Lock failures are returned and nothing is stored.
    #[instrument(skip(self, spec), fields(pipeline = %spec.pipeline.id, mode = spec.run_config.mode.as_str()))]
    pub async fn submit(&self, spec: &PipelineSpec) -> Result<RunRecord> {
        let locked = self.locker.lock(spec).await?;

        let pipeline_id = Some(spec.pipeline.id.clone()).filter(|id| !id.is_empty());
        let record = RunRecord {
            run_id: new_record_id(),
            pipeline_id,
            status: RunStatus::Queued,
            spec: serde_json::to_value(&locked.spec)?,
            locked_blocks: locked.manifest.to_value()?,
            runtime_env: serde_json::to_value(RuntimeEnv::collect())?,
            metrics: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let run = self.runs.insert_run(record).await?;
        METRICS.inc_runs_submitted();
        emit_run_submitted(&run.run_id, spec.run_config.mode.as_str(), locked.manifest.len());

        match spec.run_config.mode {
            RunMode::Sync => {
                let running = self.claim(&run.run_id).await?;
                self.execute_claimed(running, locked.spec).await
            }
            RunMode::Async => {
                match &self.queue {
                    Some(queue) => queue.enqueue(&run.run_id).await?,
                    None => warn!(run_id = %run.run_id, "no run queue attached; run stays queued"),
                }
                Ok(run)
            }
        }
    }

    /// `queued → running`. Fails with `IllegalTransition` if another worker
    /// got there first.
    pub async fn claim(&self, run_id: &str) -> Result<RunRecord> {
        let transition = RunTransition {
            status: RunStatus::Running,
            started_at: Some(Utc::now()),
            finished_at: None,
            metrics: None,
            error: None,
        };
        self.transition(run_id, RunStatus::Queued, transition).await
    }

    /// `running → succeeded | failed`.
    pub async fn finish(&self, run_id: &str, outcome: RunOutcome) -> Result<RunRecord> {
        let current = self.get_run(run_id).await?;
        let mut finished_at = Utc::now();
        if let Some(started) = current.started_at {
            finished_at = finished_at.max(started);
        }
        let transition = match outcome {
            RunOutcome::Succeeded(report) => RunTransition {
                status: RunStatus::Succeeded,
                started_at: None,
                finished_at: Some(finished_at),
                metrics: Some(serde_json::to_value(report)?),
                error: None,
            },
            RunOutcome::Failed(message) => RunTransition {
                status: RunStatus::Failed,
                started_at: None,
                finished_at: Some(finished_at),
                metrics: None,
                error: Some(if message.is_empty() {
                    "run failed".to_string()
                } else {
                    message
                }),
            },
        };
        self.transition(run_id, RunStatus::Running, transition).await
    }

    /// Worker entry point. Returns `None` when the run was not `queued`
    /// (already claimed or finished), so redelivery is harmless.
    #[instrument(skip(self))]
    pub async fn execute_queued(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let running = match self.claim(run_id).await {
            Ok(run) => run,
            Err(BenchError::IllegalTransition { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let spec: PipelineSpec = match serde_json::from_value(running.spec.clone()) {
            Ok(spec) => spec,
            Err(e) => {
                let message = format!("stored spec is unreadable: {e}");
                return self.finish(run_id, RunOutcome::Failed(message)).await.map(Some);
            }
        };
        self.execute_claimed(running, spec).await.map(Some)
    }

    async fn execute_claimed(&self, running: RunRecord, spec: PipelineSpec) -> Result<RunRecord> {
        let run_id = running.run_id.clone();
        let span = run_span(&run_id);
        async move {
            emit_run_started(&run_id, spec.run_config.seed);
            let clock = Instant::now();

            let engine = self.engine.clone();
            let outcome = match tokio::task::spawn_blocking(move || engine.execute(&spec)).await {
                Ok(Ok(report)) => RunOutcome::Succeeded(report),
                Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
                Err(join) => {
                    RunOutcome::Failed(ComputationError::Aborted(join.to_string()).to_string())
                }
            };

            let success = outcome.is_success();
            let finished = self.finish(&run_id, outcome).await;
            match &finished {
                Ok(_) => {
                    METRICS.inc_run_outcome(success);
                    emit_run_finished(&run_id, clock.elapsed().as_millis() as u64, success);
                }
                Err(e) => emit_run_finalize_error(&run_id, e),
            }
            finished
        }
        .instrument(span)
        .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| BenchError::not_found("pipeline_run", run_id))
    }

    /// Newest first.
    pub async fn list_runs(&self, status: Option<RunStatus>, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self.runs.list_runs(status, limit).await?)
    }

    /// Re-enqueue every `queued` run. Used by the daemon to pick up runs
    /// submitted by other processes.
    pub async fn enqueue_pending(&self, queue: &dyn RunQueue) -> Result<usize> {
        let pending = self.runs.list_runs(Some(RunStatus::Queued), usize::MAX).await?;
        // oldest first
        for run in pending.iter().rev() {
            queue.enqueue(&run.run_id).await?;
        }
        Ok(pending.len())
    }

    async fn transition(
        &self,
        run_id: &str,
        expected: RunStatus,
        transition: RunTransition,
    ) -> Result<RunRecord> {
        check_run_transition(run_id, expected, transition.status)?;
        let attempted = transition.status;
        self.runs
            .transition_run(run_id, expected, transition)
            .await
            .map_err(|e| match e {
                StorageError::StatusConflict { current, .. } => BenchError::IllegalTransition {
                    entity: "pipeline_run",
                    id: run_id.to_string(),
                    current,
                    attempted: attempted.to_string(),
                },
                StorageError::NotFound { .. } => BenchError::not_found("pipeline_run", run_id),
                other => other.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::fixtures;
    use crate::registry::BlockRegistry;
    use crate::seed::seed_registry;
    use blockbench_state::fakes::{MemoryBlockStore, MemoryRunStore};

    async fn manager() -> RunManager {
        let registry = BlockRegistry::new(Arc::new(MemoryBlockStore::new()));
        seed_registry(&registry).await.unwrap();
        RunManager::new(
            Arc::new(MemoryRunStore::new()),
            PipelineLocker::new(registry),
            ExecutionEngine::default(),
        )
    }

    async fn pinned(manager: &RunManager) -> PipelineSpec {
        manager.locker.pin(&fixtures::spec()).await.unwrap()
    }

    #[tokio::test]
    async fn sync_run_succeeds_with_snapshots() {
        let manager = manager().await;
        let spec = pinned(&manager).await;
        let run = manager.submit(&spec).await.unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.error.is_none());
        assert!(run.finished_at.unwrap() >= run.started_at.unwrap());
        assert_eq!(run.locked_blocks["lockedBlocks"].as_array().unwrap().len(), 5);
        assert_eq!(run.runtime_env["batchContract"]["name"], "batch.multimodal.v1");
        let metrics: MetricsReport = serde_json::from_value(run.metrics.clone().unwrap()).unwrap();
        assert!(metrics.performance.accuracy > 0.5);
        assert_eq!(run.pipeline_id.as_deref(), Some("p-toy"));
    }

    #[tokio::test]
    async fn lock_failure_stores_nothing() {
        let manager = manager().await;
        let mut spec = pinned(&manager).await;
        spec.locked_blocks[0].digest = "ffffffffffffffff".to_string();
        assert!(manager.submit(&spec).await.is_err());
        assert!(manager.list_runs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn async_run_is_claimed_once() {
        let manager = manager().await;
        let mut spec = pinned(&manager).await;
        spec.run_config.mode = RunMode::Async;
        let run = manager.submit(&spec).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);

        let done = manager.execute_queued(&run.run_id).await.unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Succeeded);
        assert!(manager.execute_queued(&run.run_id).await.unwrap().is_none());

        let err = manager
            .finish(&run.run_id, RunOutcome::Failed("late".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn computation_errors_fail_the_run() {
        let manager = manager().await;
        let mut spec = pinned(&manager).await;
        // sum fusion over 16 and 8 wide embeddings
        spec.graph.nodes[2]
            .config
            .insert("outDim".to_string(), serde_json::json!(8));
        let node = spec
            .graph
            .nodes
            .iter_mut()
            .find(|n| n.id == "fuse")
            .unwrap();
        node.block_ref.block_id = "fusions.sum".to_string();
        let spec = manager.locker.pin(&spec).await.unwrap();

        let run = manager.submit(&spec).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.error.as_deref(),
            Some("Sum fusion requires equal embedding dims (got 16 and 8).")
        );
        assert!(run.metrics.is_none());
    }
}
