use anyhow::Context;
use log::info;
use std::sync::Arc;
use tokio::fs::File;
use tokio::task::spawn_blocking;

use crate::background::types::ActiveTasks;
use crate::common::errors::ServiceError;
use crate::database::schema::image::{ImageId, ImageRecord};
use crate::database::store::RecordStore;

/// An image that is safe to stream: its filter has finished.
#[derive(Debug)]
pub struct ImageDownload {
    pub record: ImageRecord,
    pub file: File,
}

/// Refuses to serve an image while its id is in the active set.
pub struct DownloadGate {
    records: Arc<dyn RecordStore>,
    active: Arc<ActiveTasks>,
}

impl DownloadGate {
    pub fn new(records: Arc<dyn RecordStore>, active: Arc<ActiveTasks>) -> Self {
        Self { records, active }
    }

    pub async fn fetch(&self, id: &str) -> Result<ImageDownload, ServiceError> {
        info!("Get image id: {}", id);
        let Some(image_id) = ImageId::parse(id) else {
            return Err(ServiceError::NotFound(id.to_string()));
        };

        let records = Arc::clone(&self.records);
        let record = spawn_blocking(move || records.get_by_id(&image_id))
            .await
            .context("Failed to join record lookup task")??;

        if self.active.contains(&image_id) {
            info!("Image {} is still processing", image_id);
            return Err(ServiceError::ImageProcessing(image_id.to_string()));
        }
        let Some(record) = record else {
            return Err(ServiceError::NotFound(image_id.to_string()));
        };

        let file = match File::open(&record.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::NotFound(image_id.to_string()));
            }
            Err(err) => {
                return Err(anyhow::Error::from(err)
                    .context(format!("Failed to open {}", record.path))
                    .into());
            }
        };
        Ok(ImageDownload { record, file })
    }
}
