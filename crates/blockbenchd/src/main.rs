//! BlockBench worker daemon.
//!
//! Seeds the catalog, starts the run worker pool and periodically feeds it
//! every `queued` run found in the store, so runs submitted in async mode
//! by other processes get executed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use blockbench_core::metrics::METRICS;
use blockbench_core::{
    init_tracing, BenchConfig, BlockBench, ExecutionEngine, RunManager, Stores, SurrealHandle,
    WorkerPool,
};

/// How often the store is scanned for queued runs.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = BenchConfig::from_env();
    init_tracing(config.log_json, config.log_level);

    let handle = SurrealHandle::setup_from_env()
        .await
        .context("Failed to connect to SurrealDB")?;
    let bench = BlockBench::new(Stores::surreal(handle), ExecutionEngine::default());
    let report = bench.seed().await?;
    info!(
        blocks = report.blocks,
        created = report.versions_created,
        "catalog ready"
    );

    let pool = WorkerPool::start(bench.runs.clone(), config.workers);
    let bench = bench.with_queue(Arc::new(pool.queue()));
    info!(workers = pool.worker_count(), "blockbenchd started");

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        // a scan can block on a full channel, so it races the signal too
        tokio::select! {
            _ = async {
                ticker.tick().await;
                poll_once(&bench.runs, &pool).await
            } => {}
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }

    pool.shutdown().await;
    METRICS.flush();
    Ok(())
}

/// Hand every queued run to the pool. Errors are logged, never fatal.
async fn poll_once(runs: &RunManager, pool: &WorkerPool) -> usize {
    match runs.enqueue_pending(pool).await {
        Ok(0) => 0,
        Ok(n) => {
            info!(count = n, "queued runs dispatched");
            n
        }
        Err(e) => {
            warn!(error = %e, "failed to scan queued runs");
            0
        }
    }
}
