use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::spawn_blocking;

use crate::background::queue::{FilterJob, MemoryQueue, WorkQueue};
use crate::background::types::{ActiveTasks, try_acquire};
use crate::common::errors::ServiceError;
use crate::common::is_allowed_mime_type;
use crate::database::schema::image::{
    ImageFilter, ImageId, ImageRecord, ImageUpdate, now_millis,
};
use crate::database::store::RecordStore;
use crate::storage::{FileStore, storage_path};

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filter: ImageFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadDetail {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub detail: UploadDetail,
    pub id: ImageId,
    pub filename: String,
    pub filter: ImageFilter,
    pub modified_at: DateTime<Utc>,
}

impl UploadReceipt {
    fn new(record: &ImageRecord, detail: UploadDetail) -> Self {
        Self {
            detail,
            id: record.id,
            filename: record.filename().to_string(),
            filter: record.filter,
            modified_at: record.modified_at(),
        }
    }
}

pub struct UploadCoordinator<Q: WorkQueue = MemoryQueue> {
    upload_dir: PathBuf,
    records: Arc<dyn RecordStore>,
    files: Arc<dyn FileStore>,
    active: Arc<ActiveTasks>,
    queue: Arc<Q>,
}

impl<Q: WorkQueue> UploadCoordinator<Q> {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        records: Arc<dyn RecordStore>,
        files: Arc<dyn FileStore>,
        active: Arc<ActiveTasks>,
        queue: Arc<Q>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            records,
            files,
            active,
            queue,
        }
    }

    /// Store the upload, create or refresh its record and queue the filter.
    ///
    /// When the image is already being filtered the file and record are still
    /// replaced, but no second job is queued and `AlreadyProcessing` is returned.
    pub async fn submit(&self, upload: Upload) -> Result<UploadReceipt, ServiceError> {
        let start_time = Instant::now();

        // Step 1: Reject unsupported content before touching any store
        if !is_allowed_mime_type(&upload.content_type) {
            warn!(
                "Rejected {} with content type {}",
                upload.filename, upload.content_type
            );
            return Err(ServiceError::UnsupportedMediaType(upload.content_type));
        }

        // Step 2: Derive the storage path
        let path = storage_path(&self.upload_dir, &upload.filename)?;
        info!("Get file: {}. Set path: {:?}", upload.filename, path);

        // Step 3: Write bytes and create or update the record
        let records = Arc::clone(&self.records);
        let files = Arc::clone(&self.files);
        let (record, detail) =
            spawn_blocking(move || persist_upload(&*records, &*files, &path, upload))
                .await
                .context("Failed to join upload persistence task")??;

        // Step 4: Check-and-insert into the active set, then enqueue
        let Some(guard) = try_acquire(&self.active, record.id) else {
            info!("File {} is processing", record.path);
            return Err(ServiceError::AlreadyProcessing(record.id.to_string()));
        };
        self.queue.push(FilterJob::new(record.clone(), guard))?;

        info!(duration = &*format!("{:?}", start_time.elapsed());
            "Queued {} filter for {} ({:?})", record.filter, record.path, detail
        );
        Ok(UploadReceipt::new(&record, detail))
    }
}

fn persist_upload(
    records: &dyn RecordStore,
    files: &dyn FileStore,
    path: &Path,
    upload: Upload,
) -> Result<(ImageRecord, UploadDetail), ServiceError> {
    let path_str = path.to_string_lossy().into_owned();

    // A lost create race is retried once through the update branch
    for _ in 0..2 {
        if let Some(existing) = records.find_by_path(&path_str)? {
            info!("File {} already exists", path_str);
            files.delete(path)?;
            files.write(path, &upload.bytes)?;
            let size = files.size_of(path)?;
            let updated = records
                .update(
                    &existing.id,
                    ImageUpdate {
                        size,
                        filter: upload.filter,
                        modified_at: now_millis(),
                    },
                )?
                .ok_or_else(|| anyhow!("Image record {} vanished during update", existing.id))?;
            return Ok((updated, UploadDetail::Update));
        }

        files.write(path, &upload.bytes)?;
        let record = ImageRecord {
            id: ImageId::new(),
            path: path_str.clone(),
            size: files.size_of(path)?,
            mime_type: upload.content_type.clone(),
            filter: upload.filter,
            modified_at: now_millis(),
        };
        if records.create(&record)? {
            return Ok((record, UploadDetail::Create));
        }
        warn!("Concurrent upload created {} first, updating instead", path_str);
    }

    Err(anyhow!("Failed to persist upload for {}", path_str).into())
}
