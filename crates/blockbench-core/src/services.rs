//! Wiring of every core service over one set of stores.

use std::sync::Arc;

use blockbench_state::fakes::{MemoryBlockStore, MemoryCandidateStore, MemoryReviewStore, MemoryRunStore};
use blockbench_state::{BlockStore, CandidateStore, ReviewStore, RunStore, SurrealHandle, SurrealStore};

use crate::candidates::{seed_demo_candidate, CandidateWorkflow};
use crate::domain::error::Result;
use crate::engine::executor::ExecutionEngine;
use crate::explainer::Explainer;
use crate::locker::PipelineLocker;
use crate::registry::BlockRegistry;
use crate::reviews::ReviewWorkflow;
use crate::runs::RunManager;
use crate::seed::{seed_registry, SeedReport};
use crate::worker::RunQueue;

#[derive(Clone)]
pub struct Stores {
    pub blocks: Arc<dyn BlockStore>,
    pub runs: Arc<dyn RunStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub candidates: Arc<dyn CandidateStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            blocks: Arc::new(MemoryBlockStore::new()),
            runs: Arc::new(MemoryRunStore::new()),
            reviews: Arc::new(MemoryReviewStore::new()),
            candidates: Arc::new(MemoryCandidateStore::new()),
        }
    }

    pub fn surreal(handle: SurrealHandle) -> Self {
        let store = SurrealStore::new(Arc::new(handle));
        Self {
            blocks: Arc::new(store.clone()),
            runs: Arc::new(store.clone()),
            reviews: Arc::new(store.clone()),
            candidates: Arc::new(store),
        }
    }
}

/// All services sharing one registry and one engine.
#[derive(Clone)]
pub struct BlockBench {
    pub registry: BlockRegistry,
    pub reviews: ReviewWorkflow,
    pub candidates: CandidateWorkflow,
    pub locker: PipelineLocker,
    pub runs: RunManager,
    pub explainer: Explainer,
}

impl BlockBench {
    pub fn new(stores: Stores, engine: ExecutionEngine) -> Self {
        let registry = BlockRegistry::new(stores.blocks);
        let locker = PipelineLocker::new(registry.clone());
        Self {
            reviews: ReviewWorkflow::new(registry.clone(), stores.reviews, stores.candidates.clone()),
            candidates: CandidateWorkflow::new(registry.clone(), stores.candidates),
            runs: RunManager::new(stores.runs, locker.clone(), engine.clone()),
            explainer: Explainer::new(locker.clone(), engine),
            locker,
            registry,
        }
    }

    /// Route async submissions to `queue`.
    pub fn with_queue(mut self, queue: Arc<dyn RunQueue>) -> Self {
        self.runs = self.runs.with_queue(queue);
        self
    }

    /// Seed the built-in catalog and the demo candidate.
    pub async fn seed(&self) -> Result<SeedReport> {
        let report = seed_registry(&self.registry).await?;
        seed_demo_candidate(&self.candidates).await?;
        Ok(report)
    }
}
