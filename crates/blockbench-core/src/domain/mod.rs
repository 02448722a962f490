//! Domain models for BlockBench.
//!
//! Canonical definitions for the core entities:
//! - `PipelineSpec`: Declared graph, lock claims and run config
//! - `LockedBlockManifest`: Registry-verified lock entries
//! - `MetricsReport` / `RuntimeEnv` / `RunView`: Run outcome
//! - Digest, version ordering and lifecycle state machines

pub mod digest;
pub mod error;
pub mod lifecycle;
pub mod manifest;
pub mod pipeline;
pub mod run;
pub mod schema_check;
pub mod version;

// Re-export main types and errors
pub use digest::{canonical_json, compute_block_digest, compute_digest, verify_block_digest};
pub use error::{BenchError, ComputationError, ErrorKind, IntegrityError, Result, ValidationError};
pub use lifecycle::{apply_version_event, check_run_transition, next_version_status, VersionEvent};
pub use manifest::{LockedBlock, LockedBlockManifest};
pub use pipeline::{
    BlockRef, Edge, EdgeEndpoint, Graph, LockedBlockClaim, Node, NodeRole, PipelineMeta,
    PipelineSpec, PortDecl, RunConfig, RunMode, RunResources,
};
pub use run::{MetricsReport, RunView, RuntimeEnv, BATCH_CONTRACT};
pub use version::{compare_versions, Semver};
