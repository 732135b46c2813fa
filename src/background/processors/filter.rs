//! Filter engine - the CPU-bound transforms applied by the worker
//!
//! Includes:
//! - Image decoding with format detection
//! - Invert (alpha dropped, every remaining channel complemented)
//! - Canny edge map over the colour channels
//! - Re-encoding and atomic write-back

use anyhow::Context;
use image::{ColorType, DynamicImage, ImageFormat};
use log::info;
use std::{fs::read, io::Cursor, path::Path};

use super::canny::canny;
use crate::common::errors::ServiceError;
use crate::common::{CANNY_LOWER_THRESHOLD, CANNY_UPPER_THRESHOLD};
use crate::database::schema::image::ImageFilter;
use crate::storage::write_atomically;

// ────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────

/// Read the image at `path`, apply `filter` and overwrite `path` with the result.
pub fn apply_filter(path: &Path, filter: ImageFilter) -> Result<(), ServiceError> {
    let file_in_memory =
        read(path).with_context(|| format!("failed to read file into memory: {:?}", path))?;

    let format = detect_format(path, &file_in_memory).map_err(|source| ServiceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let dynamic_image = image::load_from_memory_with_format(&file_in_memory, format)
        .map_err(|source| ServiceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let filtered = transform(dynamic_image, filter);
    let encoded = encode(&filtered, format)
        .with_context(|| format!("failed to encode {:?} as {:?}", path, format))?;
    write_atomically(path, &encoded)?;

    info!("Use filter: {}", filter);
    Ok(())
}

pub fn transform(image: DynamicImage, filter: ImageFilter) -> DynamicImage {
    match filter {
        ImageFilter::Invert => invert(image),
        ImageFilter::Canny => detect_edges(&image),
    }
}

// ────────────────────────────────────────────────────────────────
// Transforms
// ────────────────────────────────────────────────────────────────

pub fn invert(image: DynamicImage) -> DynamicImage {
    let mut image = drop_alpha(image);
    image.invert();
    image
}

/// Single-channel edge map. Each pixel takes the strongest gradient of its
/// colour channels; alpha is ignored.
pub fn detect_edges(image: &DynamicImage) -> DynamicImage {
    let rgb = image.to_rgb8();
    DynamicImage::ImageLuma8(canny(&rgb, CANNY_LOWER_THRESHOLD, CANNY_UPPER_THRESHOLD))
}

fn drop_alpha(image: DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::La8 => DynamicImage::ImageLuma8(image.to_luma8()),
        ColorType::La16 => DynamicImage::ImageLuma16(image.to_luma16()),
        ColorType::Rgba8 => DynamicImage::ImageRgb8(image.to_rgb8()),
        ColorType::Rgba16 => DynamicImage::ImageRgb16(image.to_rgb16()),
        ColorType::Rgba32F => DynamicImage::ImageRgb32F(image.to_rgb32f()),
        _ => image,
    }
}

// ────────────────────────────────────────────────────────────────
// Format handling
// ────────────────────────────────────────────────────────────────

/// Content sniffing wins over the extension; the extension is the fallback
/// for formats without a reliable signature.
fn detect_format(path: &Path, bytes: &[u8]) -> Result<ImageFormat, image::ImageError> {
    match image::guess_format(bytes) {
        Ok(format) => Ok(format),
        Err(err) => ImageFormat::from_path(path).map_err(|_| err),
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
    // The JPEG encoder only takes 8-bit greyscale or RGB
    let image = if format == ImageFormat::Jpeg && image.color().has_color() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else if format == ImageFormat::Jpeg {
        DynamicImage::ImageLuma8(image.to_luma8())
    } else {
        image.clone()
    };

    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .context("image encoder rejected the filtered image")?;
    Ok(buffer)
}
