use anyhow::anyhow;
use log::{info, warn};
use rayon::ThreadPool;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_rayon::AsyncThreadPool;

use crate::background::processors::filter::apply_filter;
use crate::background::queue::{FilterJob, WorkQueue};
use crate::common::errors::{ServiceError, handle_error};

/// The single consumer of the processing queue. `spawn` takes `self`, so a
/// worker can be started at most once.
pub struct Worker<Q: WorkQueue> {
    queue: Arc<Q>,
    pool: Arc<ThreadPool>,
    dispatch_width: usize,
}

impl<Q: WorkQueue> Worker<Q> {
    pub fn new(queue: Arc<Q>, pool: Arc<ThreadPool>, dispatch_width: usize) -> Self {
        Self {
            queue,
            pool,
            dispatch_width: dispatch_width.max(1),
        }
    }

    pub fn spawn(self, runtime: &Handle) -> JoinHandle<()> {
        info!(
            "Starting filter worker (dispatch width {}, pool threads {})",
            self.dispatch_width,
            self.pool.current_num_threads()
        );
        runtime.spawn(self.run())
    }

    /// Drain the queue forever. At most `dispatch_width` filters are in flight;
    /// with the default width of one the queue is processed strictly in order.
    pub async fn run(self) {
        let limit = Arc::new(Semaphore::new(self.dispatch_width));
        loop {
            // Take a slot before popping so nothing leaves the queue early
            let permit = match Arc::clone(&limit).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let Some(job) = self.queue.pop().await else {
                warn!("Processing queue closed, filter worker stopping");
                break;
            };

            let queue = Arc::clone(&self.queue);
            let pool = Arc::clone(&self.pool);
            if self.dispatch_width == 1 {
                process_job(job, &pool).await;
                queue.task_done();
                drop(permit);
            } else {
                tokio::spawn(async move {
                    process_job(job, &pool).await;
                    queue.task_done();
                    drop(permit);
                });
            }
        }
    }
}

/// Apply the job's filter on the pool. Errors are logged, never returned: the
/// upload that queued the job has already been answered.
async fn process_job(job: FilterJob, pool: &ThreadPool) {
    let FilterJob { record, guard } = job;
    let start_time = Instant::now();
    let path = PathBuf::from(&record.path);
    let filter = record.filter;

    let result = pool
        .spawn_async(move || {
            catch_unwind(AssertUnwindSafe(|| apply_filter(&path, filter))).unwrap_or_else(|_| {
                Err(ServiceError::Internal(anyhow!("filter panicked")))
            })
        })
        .await;

    match result {
        Ok(()) => {
            info!(duration = &*format!("{:?}", start_time.elapsed());
                "Applied {} filter to {}", filter, record.path
            );
        }
        Err(err) => {
            handle_error(
                anyhow::Error::from(err)
                    .context(format!("Error while filter usage on image {}", record.id)),
            );
        }
    }

    // Releases the id from the active set
    drop(guard);
    info!("Filter usage completed for image: {}", record.id);
}
