//! Evaluation workers
//!
//! Workers pull jobs from a shared bounded queue. Retirement is cooperative:
//! a retired worker finishes its current job, observes the retire flag before
//! requesting the next one, and exits. In-progress evaluation is never
//! interrupted and queued jobs are never dropped by a resize.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One unit of evaluation work
pub(crate) struct Job {
    pub call_id: Uuid,
    pub task: Box<dyn FnOnce() + Send + 'static>,
}

/// Shared end of the bounded job queue
pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Handle to one spawned worker
pub(crate) struct WorkerHandle {
    id: usize,
    retire: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn a worker onto the current Tokio runtime
    pub fn spawn(id: usize, queue: JobQueue) -> Self {
        let retire = Arc::new(AtomicBool::new(false));
        let wakeup = Arc::new(Notify::new());

        let handle = tokio::spawn(run(id, queue, Arc::clone(&retire), Arc::clone(&wakeup)));

        Self {
            id,
            retire,
            wakeup,
            handle,
        }
    }

    /// Flag the worker to retire after its current unit of work
    pub fn retire(&self) {
        self.retire.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    /// Whether the worker task has already exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Consume the handle for an awaited shutdown
    pub fn into_join_handle(self) -> JoinHandle<()> {
        self.handle
    }
}

async fn run(id: usize, queue: JobQueue, retire: Arc<AtomicBool>, wakeup: Arc<Notify>) {
    tracing::debug!(worker_id = id, "Evaluation worker started");

    loop {
        if retire.load(Ordering::Acquire) {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = wakeup.notified() => break,
            job = next_job(&queue) => job,
        };

        match job {
            Some(job) => {
                tracing::debug!(worker_id = id, call_id = %job.call_id, "Running evaluation job");
                (job.task)();
            }
            // queue closed: the pool is shutting down
            None => break,
        }
    }

    tracing::debug!(worker_id = id, "Evaluation worker stopped");
}

async fn next_job(queue: &JobQueue) -> Option<Job> {
    queue.lock().await.recv().await
}
