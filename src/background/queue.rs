use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};

use crate::background::types::ProcessingGuard;
use crate::common::errors::ServiceError;
use crate::database::schema::image::ImageRecord;

/// One pending filter application. The guard keeps `record.id` in the active
/// set for as long as the job exists, whether it is processed or dropped.
#[derive(Debug)]
pub struct FilterJob {
    pub record: ImageRecord,
    pub guard: ProcessingGuard,
}

impl FilterJob {
    pub fn new(record: ImageRecord, guard: ProcessingGuard) -> Self {
        Self { record, guard }
    }
}

/// Work queue consumed by the filter worker. A durable backend only needs to
/// implement these four operations.
pub trait WorkQueue: Send + Sync + 'static {
    /// Never blocks.
    fn push(&self, job: FilterJob) -> Result<(), ServiceError>;

    /// Suspends until a job is available; `None` once the queue is closed and drained.
    fn pop(&self) -> impl Future<Output = Option<FilterJob>> + Send;

    /// Acknowledge a job returned by `pop`.
    fn task_done(&self);

    /// Jobs pushed but not yet popped.
    fn len(&self) -> usize;
}

/// Unbounded FIFO held in process memory. Pending jobs are lost on restart.
#[derive(Debug)]
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<FilterJob>,
    rx: Mutex<mpsc::UnboundedReceiver<FilterJob>>,
    pending: AtomicUsize,
    unfinished: AtomicUsize,
    idle: Notify,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
            unfinished: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every pushed job has been acknowledged with `task_done`.
    pub async fn join(&self) {
        loop {
            let notified = self.idle.notified();
            if self.unfinished.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl WorkQueue for MemoryQueue {
    fn push(&self, job: FilterJob) -> Result<(), ServiceError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.unfinished.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.finish_one();
            return Err(ServiceError::QueueClosed);
        }
        Ok(())
    }

    fn pop(&self) -> impl Future<Output = Option<FilterJob>> + Send {
        async move {
            let job = self.rx.lock().await.recv().await;
            if job.is_some() {
                self.pending.fetch_sub(1, Ordering::AcqRel);
            }
            job
        }
    }

    fn task_done(&self) {
        self.finish_one();
    }

    fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl MemoryQueue {
    fn finish_one(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }
}
