//! Execution engine: graph resolution, block dispatch, dataset loading and
//! the metrics pass.

pub mod blocks;
pub mod classifier;
pub mod dataset;
pub mod executor;
pub mod explain;
pub mod matrix;
pub mod params;
pub mod resolver;

pub use blocks::{EncoderKind, FusionKind};
pub use dataset::{Batch, DataLoaderRegistry, DatasetSource, Splits, ToyAvSource};
pub use executor::{ExecutionEngine, ExecutionObserver, ExecutionPlan, NoopObserver};
pub use explain::{trace_pipeline, ExplainTrace, TracePort, TraceRecorder, TraceStep};
pub use matrix::Matrix;
pub use resolver::{resolve, ResolvedEncoder, ResolvedGraph, ResolvedNode};
