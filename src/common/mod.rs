pub mod errors;

pub const MAX_DELETE_ATTEMPTS: u64 = 5;

pub const CANNY_LOWER_THRESHOLD: f32 = 50.0;

pub const CANNY_UPPER_THRESHOLD: f32 = 150.0;

/// Content types accepted by the upload endpoint. Parameters such as
/// `; charset=...` are stripped before the lookup.
pub const ALLOWED_IMAGE_MIME_TYPES: &'static [&'static str] = &[
    "image/jpeg",
    "image/png",
    "image/jpg",
    "image/jpe",
    "image/tiff",
    "image/tif",
    "image/bmp",
    "image/pbm",
    "image/pgm",
    "image/ppm",
];

pub fn is_allowed_mime_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_IMAGE_MIME_TYPES.contains(&essence.as_str())
}

use std::sync::LazyLock;

use tokio::runtime::{Builder, Runtime};

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(|| rayon::current_num_threads());

// Rocket-specific Tokio Runtime
// Upload and download handlers run here; blocking store calls are moved to its blocking pool.
pub static ROCKET_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("rocket-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build Rocket Tokio runtime")
});

// Background Tokio Runtime
// Hosts the filter worker loop. The filters themselves run on the pipeline's rayon pool.
pub static WORKER_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("filter-dispatch-worker")
        .enable_all()
        .build()
        .expect("Failed to build worker Tokio runtime")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_allow_list() {
        assert!(is_allowed_mime_type("image/png"));
        assert!(is_allowed_mime_type("IMAGE/JPEG"));
        assert!(is_allowed_mime_type("image/tiff; charset=binary"));
        assert!(!is_allowed_mime_type("text/plain"));
        assert!(!is_allowed_mime_type("image/webp"));
        assert!(!is_allowed_mime_type(""));
    }
}
