use anyhow::Result;
use log::{error, info, warn};

use image_filter_service::api::build_rocket;
use image_filter_service::background::queue::WorkQueue;
use image_filter_service::background::processors::setup::{initialize_folder, initialize_logger};
use image_filter_service::common::{ROCKET_RUNTIME, WORKER_RUNTIME};
use image_filter_service::config::AppConfig;
use image_filter_service::pipeline::Pipeline;

fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    initialize_folder(&config)?;
    initialize_logger(&config)?;
    info!("Loaded configuration: {:?}", config);

    let Pipeline {
        uploads,
        downloads,
        worker,
        queue,
        records,
        ..
    } = Pipeline::build(&config)?;
    info!("Database opened at {:?}", config.database_path);

    // The worker must be running before the first request can enqueue
    let worker_handle = worker.spawn(WORKER_RUNTIME.handle());

    let result = ROCKET_RUNTIME.block_on(async {
        let rocket_instance = build_rocket(&config, uploads, downloads).ignite().await?;
        let shutdown_handle = rocket_instance.shutdown();
        ROCKET_RUNTIME.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                shutdown_handle.notify();
            }
        });
        rocket_instance.launch().await
    });

    worker_handle.abort();
    if !queue.is_empty() {
        warn!("Dropping {} queued filter jobs on shutdown", queue.len());
    }
    drop(records);

    if let Err(e) = result {
        error!("Rocket server failed: {}", e);
        return Err(anyhow::Error::from(e));
    }
    info!("Server stopped");
    Ok(())
}
