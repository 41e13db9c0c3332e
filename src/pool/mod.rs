//! Execution resource manager
//!
//! Owns the bounded evaluation worker pool, the transient-document memory
//! accountant, and the per-call timeout, all governed by a single
//! [`ResourceConfig`] record that can be swapped at runtime. Reconfiguration
//! never cancels dispatched work: growth spawns workers immediately, shrink
//! retires workers cooperatively after their current job, and memory/timeout
//! changes only affect calls submitted afterwards.

mod memory;
mod worker;

pub use memory::{estimate_document_memory, MemoryAccountant, MemoryReservation};

use crate::config::ResourceConfig;
use crate::error::{PercolateError, Result};
use crate::metrics::POOL_WORKERS;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;
use worker::{Job, JobQueue, WorkerHandle};

/// Bounded worker pool executing percolation evaluations
///
/// Must be created inside a Tokio runtime; workers are plain async tasks.
pub struct EvaluationPool {
    config: RwLock<Arc<ResourceConfig>>,
    memory: Arc<MemoryAccountant>,
    job_tx: mpsc::Sender<Job>,
    queue: JobQueue,
    workers: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicUsize,
}

impl EvaluationPool {
    /// Create a pool with `resources.pool_size` workers and a job backlog
    /// bounded at `queue_capacity`
    pub fn new(resources: ResourceConfig, queue_capacity: usize) -> Arc<Self> {
        let (job_tx, job_rx) = mpsc::channel(queue_capacity);

        let pool = Arc::new(Self {
            config: RwLock::new(Arc::new(resources.clone())),
            memory: Arc::new(MemoryAccountant::new()),
            job_tx,
            queue: Arc::new(tokio::sync::Mutex::new(job_rx)),
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
        });

        pool.resize(resources.pool_size);
        tracing::info!(
            pool_size = resources.pool_size,
            max_memory_bytes = resources.max_memory_bytes,
            timeout_ms = resources.timeout_ms,
            queue_capacity,
            "Evaluation pool started"
        );

        pool
    }

    /// The configuration record currently in effect
    ///
    /// Callers read this once at submission time; later reconfigurations do
    /// not change the limits of a call already holding the record.
    pub fn current_config(&self) -> Arc<ResourceConfig> {
        self.config.read().clone()
    }

    /// Reserve transient document memory against the given ceiling
    pub fn reserve_memory(&self, bytes: usize, ceiling: usize) -> Result<MemoryReservation> {
        self.memory.reserve(bytes, ceiling)
    }

    /// Bytes currently reserved for in-flight documents
    pub fn used_memory(&self) -> usize {
        self.memory.used()
    }

    /// Schedule an evaluation task, returning the channel its result will
    /// arrive on
    ///
    /// A saturated backlog is backpressure, not a fault.
    pub fn submit<T, F>(&self, call_id: Uuid, task: F) -> Result<oneshot::Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job = Job {
            call_id,
            task: Box::new(move || {
                // the receiver may have timed out and gone; the result is
                // simply discarded in that case
                let _ = result_tx.send(task());
            }),
        };

        self.job_tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                PercolateError::ResourceExhausted("evaluation queue is saturated".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                PercolateError::Internal("evaluation pool is shut down".to_string())
            }
        })?;

        Ok(result_rx)
    }

    /// Wait for a submitted task, abandoning it after `timeout`
    ///
    /// Abandonment does not interrupt the worker: the evaluation finishes,
    /// its result is discarded, and its resources are reclaimed when the
    /// worker completes.
    pub async fn await_result<T>(
        &self,
        result_rx: oneshot::Receiver<T>,
        timeout: Duration,
    ) -> Result<T> {
        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(PercolateError::Internal(
                "evaluation worker dropped the result channel".to_string(),
            )),
            Err(_) => Err(PercolateError::Timeout(timeout)),
        }
    }

    /// Atomically install a new configuration record and resize the worker
    /// set to match
    pub fn reconfigure(&self, resources: ResourceConfig) {
        let resources = Arc::new(resources);
        let previous = {
            let mut slot = self.config.write();
            std::mem::replace(&mut *slot, Arc::clone(&resources))
        };

        if previous != resources {
            tracing::info!(
                pool_size = resources.pool_size,
                max_memory_bytes = resources.max_memory_bytes,
                timeout_ms = resources.timeout_ms,
                "Resource configuration updated"
            );
        }

        self.resize(resources.pool_size);
    }

    /// Apply settings-change notifications delivered on `settings_rx` until
    /// the sender goes away
    pub fn subscribe(self: &Arc<Self>, mut settings_rx: watch::Receiver<ResourceConfig>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            while settings_rx.changed().await.is_ok() {
                let resources = settings_rx.borrow_and_update().clone();
                pool.reconfigure(resources);
            }
            tracing::debug!("Settings channel closed, stopping reconfiguration task");
        })
    }

    /// Number of live (non-retired) workers
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Retire every worker and wait for them to drain
    pub async fn shutdown(&self) {
        let retired: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };

        for worker in &retired {
            worker.retire();
        }

        let handles: Vec<JoinHandle<()>> = retired
            .into_iter()
            .map(WorkerHandle::into_join_handle)
            .collect();
        let _ = futures::future::join_all(handles).await;

        POOL_WORKERS.set(0);
        tracing::info!("Evaluation pool shut down");
    }

    fn resize(&self, target: usize) {
        let mut workers = self.workers.lock();
        workers.retain(|worker| !worker.is_finished());

        while workers.len() < target {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            workers.push(WorkerHandle::spawn(id, Arc::clone(&self.queue)));
            tracing::debug!(worker_id = id, "Spawned evaluation worker");
        }

        if workers.len() > target {
            for worker in workers.drain(target..) {
                tracing::debug!(worker_id = worker.id(), "Retiring evaluation worker");
                worker.retire();
            }
        }

        POOL_WORKERS.set(workers.len() as i64);
    }
}
