use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use image_filter_service::api::build_rocket;
use image_filter_service::background::processors::setup::initialize_folder;
use image_filter_service::background::queue::{MemoryQueue, WorkQueue};
use image_filter_service::background::worker::Worker;
use image_filter_service::config::AppConfig;
use image_filter_service::database::store::RedbRecordStore;
use image_filter_service::pipeline::Pipeline;
use image_filter_service::storage::LocalFileStore;

const BOUNDARY: &str = "image-filter-service-boundary";

struct TestApp {
    client: Client,
    queue: Arc<MemoryQueue>,
    worker: Option<Worker<MemoryQueue>>,
    upload_dir: std::path::PathBuf,
}

async fn test_app(root: &Path) -> TestApp {
    let config = AppConfig {
        upload_dir: root.join("uploads"),
        database_path: root.join("db").join("images.redb"),
        log_dir: root.join("logs"),
        filter_threads: 2,
        ..AppConfig::default()
    };
    initialize_folder(&config).unwrap();
    let Pipeline {
        uploads,
        downloads,
        worker,
        queue,
        ..
    } = Pipeline::build_with(
        &config,
        Arc::new(RedbRecordStore::in_memory().unwrap()),
        Arc::new(LocalFileStore),
    )
    .unwrap();

    let client = Client::untracked(build_rocket(&config, uploads, downloads))
        .await
        .unwrap();
    TestApp {
        client,
        queue,
        worker: Some(worker),
        upload_dir: config.upload_dir,
    }
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_fn(6, 6, |x, y| Rgb([(x * 40) as u8, (y * 40) as u8, 120]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart(
    filename: &str,
    content_type: &str,
    bytes: &[u8],
    filter: Option<&str>,
) -> (ContentType, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    if let Some(filter) = filter {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"filter\"\r\n\r\n{filter}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let content_type =
        ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY));
    (content_type, body)
}

async fn post_upload(
    app: &TestApp,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
    filter: Option<&str>,
) -> (Status, Value) {
    let (form_type, body) = multipart(filename, content_type, bytes, filter);
    let response = app
        .client
        .post("/img_api/upload")
        .header(form_type)
        .body(body)
        .dispatch()
        .await;
    let status = response.status();
    (status, response.into_json::<Value>().await.unwrap())
}

async fn drain(app: &TestApp) {
    tokio::time::timeout(Duration::from_secs(10), app.queue.join())
        .await
        .expect("worker did not drain the queue");
}

#[tokio::test]
async fn upload_filter_and_download() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = test_app(dir.path()).await;
    let original = png_bytes();

    let (status, body) = post_upload(&app, "cat.png", "image/png", &original, Some("invert")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["detail"], "create");
    assert_eq!(body["filename"], "cat.png");
    assert_eq!(body["filter"], "invert");
    let id = body["id"].as_str().unwrap().to_string();

    // Nothing drains the queue yet, so the image is still busy
    let response = app
        .client
        .get(format!("/img_api/download?id={id}"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Accepted);

    let handle = app.worker.take().unwrap().spawn(&Handle::current());
    drain(&app).await;

    let response = app
        .client
        .get(format!("/img_api/download?id={id}"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::PNG));
    let served = response.into_bytes().await.unwrap();

    let mut expected = image::load_from_memory(&original).unwrap();
    expected.invert();
    assert_eq!(
        image::load_from_memory(&served).unwrap().as_bytes(),
        expected.as_bytes()
    );
    handle.abort();
}

#[tokio::test]
async fn reupload_while_busy_is_accepted_without_requeue() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path()).await;

    let (status, first) = post_upload(&app, "dog.png", "image/png", &png_bytes(), None).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(first["filter"], "invert");

    let (status, body) =
        post_upload(&app, "dog.png", "image/png", &png_bytes(), Some("canny")).await;
    assert_eq!(status, Status::Accepted);
    assert!(body["error"].as_str().unwrap().contains("File processing"));
    assert_eq!(app.queue.len(), 1);
}

#[tokio::test]
async fn reupload_after_filter_updates_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = test_app(dir.path()).await;
    let handle = app.worker.take().unwrap().spawn(&Handle::current());

    let (_, first) = post_upload(&app, "owl.png", "image/png", &png_bytes(), None).await;
    drain(&app).await;

    let (status, second) =
        post_upload(&app, "owl.png", "image/png", &png_bytes(), Some("edge-detect")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(second["detail"], "update");
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["filter"], "canny");
    drain(&app).await;

    let stored = image::open(app.upload_dir.join("owl.png")).unwrap();
    assert_eq!(stored.color(), image::ColorType::L8);
    handle.abort();
}

#[tokio::test]
async fn wrong_type_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path()).await;

    let (status, body) = post_upload(&app, "notes.txt", "text/plain", b"hello", None).await;
    assert_eq!(status, Status::NotFound);
    assert!(body["error"].as_str().unwrap().contains("Wrong file type"));
    assert!(!app.upload_dir.join("notes.txt").exists());
    assert!(app.queue.is_empty());
}

#[tokio::test]
async fn unknown_filter_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path()).await;

    let (status, _) = post_upload(&app, "cat.png", "image/png", &png_bytes(), Some("blur")).await;
    assert_eq!(status, Status::UnprocessableEntity);
    assert!(!app.upload_dir.join("cat.png").exists());
}

#[tokio::test]
async fn download_of_unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path()).await;

    let response = app.client.get("/img_api/download?id=nope").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let body = response.into_json::<Value>().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Image not found"));
}

#[tokio::test]
async fn cors_headers_and_preflight() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path()).await;

    let response = app
        .client
        .options("/img_api/upload")
        .header(Header::new("Origin", "http://example.test"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);
    assert_eq!(
        response.headers().get_one("Access-Control-Allow-Origin"),
        Some("*")
    );

    let response = app.client.get("/img_api/download?id=nope").dispatch().await;
    assert_eq!(
        response.headers().get_one("Access-Control-Allow-Origin"),
        Some("*")
    );
}
