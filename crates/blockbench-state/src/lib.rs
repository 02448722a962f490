//! BlockBench State: persistence layer for the block registry and run ledger
//!
//! ## Key Components
//!
//! - `records`: Row types for blocks, versions, runs, reviews and paper candidates
//! - `storage_traits`: Backend-agnostic async store traits with compare-and-set
//!   status transitions
//! - `fakes`: In-memory implementations for tests and ephemeral use
//! - `SurrealHandle` / `SurrealStore`: SurrealDB connection and trait implementations

mod error;
pub mod fakes;
mod handle;
pub mod records;
pub mod storage_traits;
mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{RemoteConfig, SurrealHandle};
pub use records::{
    new_record_id, BlockCategory, BlockPermissions, BlockRecord, BlockTests, BlockVersionRecord,
    CandidateRecord, CandidateStatus, PaperRef, ReviewRecord, ReviewState, ReviewTargetType,
    RunRecord, RunStatus, RunTransition, VersionStatus,
};
pub use storage_traits::{BlockStore, CandidateStore, ReviewStore, RunStore, StorageResult};
pub use surreal_store::SurrealStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
