//! Request-facing flows that sit between the HTTP layer and the background worker.
//!
//! - [`upload::UploadCoordinator`] stores uploads and queues filter jobs
//! - [`download::DownloadGate`] serves images whose filter has finished

pub mod download;
pub mod upload;

pub use download::{DownloadGate, ImageDownload};
pub use upload::{Upload, UploadCoordinator, UploadDetail, UploadReceipt};
