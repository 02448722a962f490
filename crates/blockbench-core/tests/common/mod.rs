//! Shared setup for integration tests.

#![allow(dead_code)]

use blockbench_core::{BlockBench, ExecutionEngine, PipelineSpec, Stores};
use serde_json::{json, Value};

/// Seeded in-memory services with the default dataset loaders.
pub async fn bench() -> BlockBench {
    bench_with(ExecutionEngine::default()).await
}

pub async fn bench_with(engine: ExecutionEngine) -> BlockBench {
    let bench = BlockBench::new(Stores::in_memory(), engine);
    bench.seed().await.expect("seed registry");
    bench
}

pub fn node(id: &str, role: &str, slug: &str, version: &str, config: Value) -> Value {
    json!({
        "id": id,
        "type": role,
        "blockRef": {"blockId": slug, "version": version},
        "config": config
    })
}

/// Toy AV pipeline with two linear encoders of the given widths.
pub fn spec_json(seed: u64, fusion: &str, out_a: u64, out_v: u64) -> Value {
    json!({
        "specVersion": "0.1.0",
        "pipeline": {"id": "p-test", "name": "test"},
        "graph": {
            "nodes": [
                node("ds", "dataset", "datasets.toy_av", "1.1.0", json!({"n": 800, "trainRatio": 0.8})),
                node("encA", "encoder", "unimodals.linear", "1.1.0", json!({"outDim": out_a, "modalityKey": "audio"})),
                node("encV", "encoder", "unimodals.linear", "1.1.0", json!({"outDim": out_v, "modalityKey": "vision"})),
                node("fuse", "fusion", fusion, "1.0.0", json!({})),
                node("obj", "objective", "objective_functions.cross_entropy", "1.0.0", json!({})),
                node("train", "trainer", "training_structures.sgd_classifier", "1.0.0", json!({"maxIter": 300, "alpha": 0.0001})),
                node("eval", "evaluator", "eval_scripts.basic", "1.0.0", json!({"noiseStd": 0.2}))
            ],
            "edges": [
                {"id": "e1", "from": {"nodeId": "ds", "port": "batch"}, "to": {"nodeId": "encA", "port": "batch"}},
                {"id": "e2", "from": {"nodeId": "ds", "port": "batch"}, "to": {"nodeId": "encV", "port": "batch"}},
                {"id": "e3", "from": {"nodeId": "encA", "port": "embed"}, "to": {"nodeId": "fuse", "port": "a"}},
                {"id": "e4", "from": {"nodeId": "encV", "port": "embed"}, "to": {"nodeId": "fuse", "port": "b"}}
            ]
        },
        "lockedBlocks": [],
        "runConfig": {"seed": seed, "mode": "sync"}
    })
}

pub fn spec(seed: u64, fusion: &str, out_a: u64, out_v: u64) -> PipelineSpec {
    serde_json::from_value(spec_json(seed, fusion, out_a, out_v)).expect("spec parses")
}

/// Same spec with lock claims pinned to the registry's digests.
pub async fn pinned(bench: &BlockBench, spec: &PipelineSpec) -> PipelineSpec {
    bench.locker.pin(spec).await.expect("pin spec")
}
