//! Asynchronous run queue backed by a tokio worker pool.
//!
//! The pool owns the only strong sender. Queue handles hold weak senders, so
//! [`WorkerPool::shutdown`] closes the channel by dropping its sender; workers
//! then drain what is buffered and exit.
//!
//! A run id sits in the channel at most once. Enqueueing an id that is
//! already buffered is a no-op until a worker takes it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::error::{BenchError, Result};
use crate::runs::RunManager;

const QUEUE_BUFFER: usize = 100;

/// Hands queued run ids to whatever executes them.
#[async_trait]
pub trait RunQueue: Send + Sync {
    async fn enqueue(&self, run_id: &str) -> Result<()>;
}

/// Run ids currently buffered in the channel.
#[derive(Clone, Default)]
struct Buffered(Arc<StdMutex<HashSet<String>>>);

impl Buffered {
    /// Returns `false` if the id is already buffered.
    fn mark(&self, run_id: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(run_id.to_string())
    }

    fn release(&self, run_id: &str) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).remove(run_id);
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Cloneable submission side of a [`WorkerPool`].
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::WeakSender<String>,
    buffered: Buffered,
}

#[async_trait]
impl RunQueue for QueueHandle {
    async fn enqueue(&self, run_id: &str) -> Result<()> {
        let sender = self
            .sender
            .upgrade()
            .ok_or_else(|| BenchError::Queue("worker pool stopped".to_string()))?;
        if !self.buffered.mark(run_id) {
            debug!(%run_id, "run already buffered");
            return Ok(());
        }
        if sender.send(run_id.to_string()).await.is_err() {
            self.buffered.release(run_id);
            return Err(BenchError::Queue("worker pool channel closed".to_string()));
        }
        Ok(())
    }
}

/// Fixed-size pool of workers, each calling
/// [`RunManager::execute_queued`] once per delivered run id.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<String>>,
    buffered: Buffered,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks (at least one) on the current runtime.
    pub fn start(manager: RunManager, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<String>(QUEUE_BUFFER);
        let receiver = Arc::new(Mutex::new(receiver));
        let buffered = Buffered::default();

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let buffered = buffered.clone();
                let manager = manager.clone();
                tokio::spawn(async move {
                    debug!(worker_id, "run worker started");
                    loop {
                        let next = { receiver.lock().await.recv().await };
                        let Some(run_id) = next else { break };
                        buffered.release(&run_id);
                        match manager.execute_queued(&run_id).await {
                            Ok(Some(run)) => {
                                info!(worker_id, run_id = %run.run_id, status = %run.status, "run processed")
                            }
                            Ok(None) => debug!(worker_id, %run_id, "run already claimed elsewhere"),
                            Err(e) => error!(worker_id, %run_id, error = %e, "run processing failed"),
                        }
                    }
                    debug!(worker_id, "run worker stopped");
                })
            })
            .collect();

        info!(workers, "worker pool started");
        Self {
            sender: Some(sender),
            buffered,
            workers: handles,
        }
    }

    /// A submission handle. Stops accepting once the pool shuts down.
    pub fn queue(&self) -> QueueHandle {
        QueueHandle {
            sender: self
                .sender
                .as_ref()
                .map(mpsc::Sender::downgrade)
                .unwrap_or_else(|| mpsc::channel::<String>(1).0.downgrade()),
            buffered: self.buffered.clone(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Run ids waiting in the channel for a worker.
    pub fn buffered(&self) -> usize {
        self.buffered.len()
    }

    /// Close the channel, let workers drain the buffer, and join them.
    pub async fn shutdown(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "run worker panicked");
            }
        }
        info!("worker pool stopped");
    }
}

#[async_trait]
impl RunQueue for WorkerPool {
    async fn enqueue(&self, run_id: &str) -> Result<()> {
        self.queue().enqueue(run_id).await
    }
}
