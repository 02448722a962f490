//! BlockBench Core Library
//!
//! Block registry, review workflow, pipeline locker, execution engine, run
//! lifecycle and explain traces over the `blockbench-state` stores.

pub mod access;
pub mod candidates;
pub mod config;
pub mod domain;
pub mod engine;
pub mod explainer;
pub mod locker;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod reviews;
pub mod runs;
pub mod seed;
pub mod services;
pub mod telemetry;
pub mod worker;

pub use access::Caller;
pub use candidates::{CandidateWorkflow, MaterializeReport, ProposedBlock};
pub use config::BenchConfig;
pub use domain::{
    compute_block_digest, BenchError, ComputationError, ErrorKind, IntegrityError,
    LockedBlockManifest, MetricsReport, PipelineSpec, Result, RunView, ValidationError,
};
pub use engine::{DataLoaderRegistry, DatasetSource, ExecutionEngine, ExplainTrace};
pub use explainer::Explainer;
pub use locker::{LockedPipeline, PipelineLocker};
pub use registry::{BlockRegistry, BlockSummary, VersionDraft};
pub use reviews::ReviewWorkflow;
pub use runs::{RunManager, RunOutcome};
pub use seed::{seed_registry, SeedReport};
pub use services::{BlockBench, Stores};
pub use telemetry::init_tracing;
pub use worker::{QueueHandle, RunQueue, WorkerPool};

pub use blockbench_state::{
    BlockCategory, CandidateStatus, ReviewState, RunRecord, RunStatus, SurrealHandle,
    VersionStatus,
};

/// Crate version, recorded in run runtime environments.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
