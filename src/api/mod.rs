pub mod fairings;
pub mod handlers;

use rocket::data::{Limits, ToByteUnit};
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::{Build, Rocket};
use serde_json::json;
use std::io::Cursor;

use crate::common::errors::ServiceError;
use crate::config::AppConfig;
use crate::service::{DownloadGate, UploadCoordinator};
use fairings::cors::{cors_fairing, generate_cors_routes};
use handlers::image::generate_image_routes;

#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let outer_msg = self.error.to_string();

        let chain: Vec<String> = self.error.chain().map(|e| e.to_string()).collect();

        let body = json!({
            "error": outer_msg,
            "chain": chain,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        let error = anyhow::Error::from(err);
        let status = error
            .downcast_ref::<ServiceError>()
            .map(status_for)
            .unwrap_or(Status::InternalServerError);
        AppError { status, error }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// HTTP status for each service failure. Both busy cases answer 202 so a
/// client can poll until the filter finishes.
pub fn status_for(error: &ServiceError) -> Status {
    match error {
        ServiceError::UnsupportedMediaType(_) => Status::NotFound,
        ServiceError::InvalidFilename(_) => Status::BadRequest,
        ServiceError::UnknownFilter(_) => Status::UnprocessableEntity,
        ServiceError::AlreadyProcessing(_) => Status::Accepted,
        ServiceError::ImageProcessing(_) => Status::Accepted,
        ServiceError::NotFound(_) => Status::NotFound,
        ServiceError::QueueClosed => Status::ServiceUnavailable,
        ServiceError::Decode { .. } | ServiceError::Internal(_) => Status::InternalServerError,
    }
}

pub fn build_rocket(
    config: &AppConfig,
    uploads: UploadCoordinator,
    downloads: DownloadGate,
) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("file", config.upload_limit_mb.mebibytes())
        .limit("data-form", config.upload_limit_mb.mebibytes());
    let figment = rocket::Config::figment()
        .merge(("shutdown.ctrlc", false))
        .merge(("limits", limits));

    rocket::custom(figment)
        .attach(cors_fairing())
        .manage(uploads)
        .manage(downloads)
        .mount("/img_api", generate_image_routes())
        .mount("/", generate_cors_routes())
}
