//! Domain-level error taxonomy for BlockBench.
//!
//! Errors fall into four families:
//! - [`ValidationError`]: malformed input (spec shape, node config, slugs). Client error.
//! - [`IntegrityError`]: a lock claim that does not match the registry. Always raised
//!   before any computation runs.
//! - [`ComputationError`]: raised while executing a pipeline; recorded verbatim on the run.
//! - Lifecycle errors on [`BenchError`] itself (`IllegalTransition`, `Forbidden`, ...).

use blockbench_state::StorageError;

/// Malformed pipeline spec, node config or registry input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("incomplete pipeline: missing or insufficient role '{role}' (expected {expected})")]
    IncompletePipeline { role: String, expected: String },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid config for node '{node_id}' at '{field}': {reason}")]
    InvalidConfig {
        node_id: String,
        field: String,
        reason: String,
    },

    #[error("node '{node_id}' uses {slug}@{version}, which is not in lockedBlocks")]
    UnlockedNode {
        node_id: String,
        slug: String,
        version: String,
    },

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("invalid block slug '{0}': expected lowercase [a-z0-9._-], starting alphanumeric")]
    InvalidSlug(String),

    #[error("block '{slug}' is registered as {existing}; refusing to re-register it as {requested}")]
    CategoryChange {
        slug: String,
        existing: String,
        requested: String,
    },
}

/// A locked-block claim that does not hold against the registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrityError {
    #[error("unknown block in lockedBlocks: {slug}")]
    UnknownBlock { slug: String },

    #[error("unknown block version: {slug}@{version}")]
    UnknownBlockVersion { slug: String, version: String },

    #[error("digest mismatch for {slug}@{version}: expected {expected}, got {actual}")]
    DigestMismatch {
        slug: String,
        version: String,
        expected: String,
        actual: String,
    },

    #[error("locked block version not published: {slug}@{version} ({status})")]
    BlockNotPublished {
        slug: String,
        version: String,
        status: String,
    },
}

/// Failure while executing a resolved pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("Sum fusion requires equal embedding dims (got {left} and {right}).")]
    DimensionMismatch { left: usize, right: usize },

    #[error("fusion inputs have different batch sizes ({left} vs {right})")]
    BatchSizeMismatch { left: usize, right: usize },

    #[error("matrix shapes are incompatible: {0}")]
    Shape(String),

    #[error("Unsupported {role} block: {slug}")]
    UnsupportedBlock { role: String, slug: String },

    #[error("Unsupported dataset block: {slug}")]
    UnsupportedDataset { slug: String },

    #[error("Unknown modalityKey '{key}'. Available: {available:?}")]
    UnknownModality { key: String, available: Vec<String> },

    #[error("Dataset did not provide labels for {purpose}.")]
    MissingLabels { purpose: String },

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("execution aborted: {0}")]
    Aborted(String),
}

/// Coarse classification of a [`BenchError`] for outer transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller sent something malformed or unauthorized.
    Client,
    /// A lock claim failed registry verification.
    Integrity,
    /// State-machine race or duplicate write.
    Conflict,
    /// Pipeline execution failed.
    Computation,
    /// Storage or serialization failure.
    Internal,
}

/// BlockBench domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Computation(#[from] ComputationError),

    #[error("illegal {entity} transition for {id}: cannot {attempted} from {current}")]
    IllegalTransition {
        entity: &'static str,
        id: String,
        current: String,
        attempted: String,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("version {version} of {slug} already exists")]
    DuplicateVersion { slug: String, version: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("run queue unavailable: {0}")]
    Queue(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::Validation(_) | BenchError::Forbidden(_) | BenchError::NotFound { .. } => {
                ErrorKind::Client
            }
            BenchError::Integrity(_) => ErrorKind::Integrity,
            BenchError::IllegalTransition { .. } | BenchError::DuplicateVersion { .. } => {
                ErrorKind::Conflict
            }
            BenchError::Computation(_) => ErrorKind::Computation,
            BenchError::Storage(StorageError::NotFound { .. }) => ErrorKind::Client,
            BenchError::Storage(StorageError::DuplicateKey { .. })
            | BenchError::Storage(StorageError::StatusConflict { .. }) => ErrorKind::Conflict,
            BenchError::Storage(_) | BenchError::Serialization(_) | BenchError::Queue(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        BenchError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type for BlockBench domain operations.
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_mismatch_reports_both_values() {
        let err: BenchError = IntegrityError::DigestMismatch {
            slug: "fusions.concat".to_string(),
            version: "1.0.0".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn incomplete_pipeline_names_role() {
        let err = ValidationError::IncompletePipeline {
            role: "encoder".to_string(),
            expected: "at least 2".to_string(),
        };
        assert!(err.to_string().contains("'encoder'"));
    }

    #[test]
    fn classification() {
        let illegal = BenchError::IllegalTransition {
            entity: "block_version",
            id: "v1".to_string(),
            current: "published".to_string(),
            attempted: "submit".to_string(),
        };
        assert_eq!(illegal.kind(), ErrorKind::Conflict);
        assert!(illegal.to_string().contains("cannot submit from published"));

        let comp: BenchError = ComputationError::DimensionMismatch { left: 16, right: 8 }.into();
        assert_eq!(comp.kind(), ErrorKind::Computation);
        assert!(comp.to_string().starts_with("Sum fusion requires equal embedding dims"));

        let storage: BenchError = StorageError::Backend("down".to_string()).into();
        assert_eq!(storage.kind(), ErrorKind::Internal);
        assert_eq!(BenchError::Forbidden("x".into()).kind(), ErrorKind::Client);
    }
}
