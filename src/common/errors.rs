use log::error;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Wrong file type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("File processing: image {0} is already being filtered")]
    AlreadyProcessing(String),

    #[error("Image processing: image {0} is not ready yet")]
    ImageProcessing(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Failed to decode image {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Processing queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Log the full error chain and hand the error back to the caller.
pub fn handle_error(error: anyhow::Error) -> anyhow::Error {
    error!("{:?}", error);
    error
}
