use anyhow::{Context, anyhow};
use log::info;
use rocket::form::{Errors, Form};
use rocket::fs::TempFile;
use rocket::http::ContentType;
use rocket::serde::json::Json;
use rocket::{Route, State};
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::api::AppResult;
use crate::database::schema::image::ImageFilter;
use crate::service::{DownloadGate, ImageDownload, Upload, UploadCoordinator, UploadReceipt};

pub fn generate_image_routes() -> Vec<Route> {
    routes![upload, download]
}

#[derive(FromForm, Debug)]
pub struct UploadForm<'r> {
    pub file: TempFile<'r>,

    /// `invert` when absent
    pub filter: Option<String>,
}

fn get_filename(file: &TempFile<'_>) -> String {
    file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default()
}

fn get_content_type(file: &TempFile<'_>) -> String {
    file.content_type()
        .map(|ct| ct.to_string())
        .unwrap_or_default()
}

#[post("/upload", data = "<form>")]
pub async fn upload(
    uploads: &State<UploadCoordinator>,
    form: Result<Form<UploadForm<'_>>, Errors<'_>>,
) -> AppResult<Json<UploadReceipt>> {
    let start_time = Instant::now();
    let inner_form = match form {
        Ok(form) => form.into_inner(),
        Err(errors) => {
            let error_chain = errors
                .iter()
                .map(|e| anyhow!(e.to_string()))
                .reduce(|acc, e| acc.context(e.to_string()));

            return match error_chain {
                Some(chain) => Err(chain.context("Failed to parse form").into()),
                None => Err(anyhow!("Failed to parse form with unknown error").into()),
            };
        }
    };

    let filter = match inner_form.filter.as_deref() {
        Some(name) => name.parse::<ImageFilter>()?,
        None => ImageFilter::default(),
    };
    let filename = get_filename(&inner_form.file);
    let content_type = get_content_type(&inner_form.file);

    let mut bytes = Vec::new();
    let mut reader = Box::pin(
        inner_form
            .file
            .open()
            .await
            .context("Failed to open uploaded file")?,
    );
    reader
        .read_to_end(&mut bytes)
        .await
        .context("Failed to read uploaded file")?;

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "Get file '{}' ({}, {} bytes)",
        filename,
        content_type,
        bytes.len()
    );

    let receipt = uploads
        .submit(Upload {
            filename,
            bytes,
            content_type,
            filter,
        })
        .await?;
    Ok(Json(receipt))
}

#[get("/download?<id>")]
pub async fn download(
    downloads: &State<DownloadGate>,
    id: &str,
) -> AppResult<(ContentType, File)> {
    let ImageDownload { record, file } = downloads.fetch(id).await?;
    let content_type = ContentType::parse_flexible(&record.mime_type).unwrap_or(ContentType::Binary);
    Ok((content_type, file))
}
