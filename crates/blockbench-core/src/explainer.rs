//! Explain generator: lock a spec, then execute it once with a trace recorder.
//!
//! Nothing is persisted. The trace and its metrics come from the same engine
//! pass, so the explained numbers are the numbers a run would record.

use tracing::instrument;

use crate::domain::error::{ComputationError, Result};
use crate::domain::pipeline::PipelineSpec;
use crate::engine::executor::ExecutionEngine;
use crate::engine::explain::{trace_pipeline, ExplainTrace};
use crate::locker::PipelineLocker;
use crate::metrics::METRICS;

#[derive(Clone)]
pub struct Explainer {
    locker: PipelineLocker,
    engine: ExecutionEngine,
}

impl Explainer {
    pub fn new(locker: PipelineLocker, engine: ExecutionEngine) -> Self {
        Self { locker, engine }
    }

    #[instrument(skip(self, spec), fields(pipeline = %spec.pipeline.id))]
    pub async fn explain(&self, spec: &PipelineSpec) -> Result<ExplainTrace> {
        let locked = self.locker.lock(spec).await?;
        let engine = self.engine.clone();
        let trace = tokio::task::spawn_blocking(move || trace_pipeline(&engine, &locked.spec))
            .await
            .map_err(|e| ComputationError::Aborted(e.to_string()))??;
        METRICS.inc_explain_traces();
        Ok(trace)
    }
}
