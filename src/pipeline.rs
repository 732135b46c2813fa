//! Wires the stores, queue, active set and worker into one set of components.

use anyhow::{Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

use crate::background::queue::MemoryQueue;
use crate::background::types::ActiveTasks;
use crate::background::worker::Worker;
use crate::config::AppConfig;
use crate::database::store::{RecordStore, RedbRecordStore};
use crate::service::{DownloadGate, UploadCoordinator};
use crate::storage::{FileStore, LocalFileStore};

pub struct Pipeline {
    pub uploads: UploadCoordinator,
    pub downloads: DownloadGate,
    pub worker: Worker<MemoryQueue>,
    pub queue: Arc<MemoryQueue>,
    pub active: Arc<ActiveTasks>,
    pub records: Arc<dyn RecordStore>,
}

impl Pipeline {
    /// Open the on-disk record store named by the configuration.
    pub fn build(config: &AppConfig) -> Result<Self> {
        let records = RedbRecordStore::open(&config.database_path)?;
        Self::build_with(config, Arc::new(records), Arc::new(LocalFileStore))
    }

    pub fn build_with(
        config: &AppConfig,
        records: Arc<dyn RecordStore>,
        files: Arc<dyn FileStore>,
    ) -> Result<Self> {
        let pool = Arc::new(build_filter_pool(config.filter_threads)?);
        let queue = Arc::new(MemoryQueue::new());
        let active = ActiveTasks::shared();

        let uploads = UploadCoordinator::new(
            config.upload_dir.clone(),
            Arc::clone(&records),
            files,
            Arc::clone(&active),
            Arc::clone(&queue),
        );
        let downloads = DownloadGate::new(Arc::clone(&records), Arc::clone(&active));
        let worker = Worker::new(Arc::clone(&queue), pool, config.dispatch_width);

        Ok(Self {
            uploads,
            downloads,
            worker,
            queue,
            active,
            records,
        })
    }
}

fn build_filter_pool(num_threads: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("cpu-intensive-worker-{}", i))
        .build()
        .context("Failed to build filter thread pool")
}
