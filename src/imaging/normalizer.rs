//! Upload image normalizer.
//!
//! Raster uploads are decoded, downscaled to fit a bounding box and
//! re-encoded as JPEG at maximum quality. Vector uploads pass through.
//!
//! # Fallback Tiers
//!
//! Normalization never fails. Each tier is tried only if the previous one
//! failed:
//!
//! 1. resize (if needed) + JPEG encode
//! 2. JPEG encode of the original decoded image
//! 3. raw bytes with `application/octet-stream`
//!
//! A payload that cannot be decoded at all goes straight to tier 3.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};
use tracing::{debug, warn};

use crate::store::DEFAULT_CONTENT_TYPE;

/// Maximum width of a normalized raster image.
pub const MAX_IMAGE_WIDTH: u32 = 1920;

/// Maximum height of a normalized raster image.
pub const MAX_IMAGE_HEIGHT: u32 = 1080;

/// JPEG quality used for re-encoding.
pub const NORMALIZED_JPEG_QUALITY: u8 = 100;

/// Content type of vector uploads.
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Content type of re-encoded raster uploads.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

// =============================================================================
// Normalized Image
// =============================================================================

/// Result of normalizing one upload.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Bytes to store
    pub data: Bytes,

    /// Content type to store them with
    pub content_type: &'static str,

    /// File extension (with leading dot) matching `data`
    pub extension: String,
}

impl NormalizedImage {
    /// Whether the payload was re-encoded as JPEG.
    pub fn is_jpeg(&self) -> bool {
        self.content_type == JPEG_CONTENT_TYPE
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Normalizes uploaded images before they are stored.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    max_width: u32,
    max_height: u32,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageNormalizer {
    /// Create a normalizer with the default 1920×1080 bound.
    pub fn new() -> Self {
        Self::with_bounds(MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT)
    }

    /// Create a normalizer with a custom bounding box.
    pub fn with_bounds(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
        }
    }

    /// Normalize one upload.
    ///
    /// `declared_type` is the part's `Content-Type` header, if any.
    pub fn normalize(
        &self,
        data: Bytes,
        filename: &str,
        declared_type: Option<&str>,
    ) -> NormalizedImage {
        self.normalize_with(data, filename, declared_type, encode_jpeg)
    }

    /// [`ImageNormalizer::normalize`] with a caller-supplied JPEG encoder.
    fn normalize_with<E>(
        &self,
        data: Bytes,
        filename: &str,
        declared_type: Option<&str>,
        encode: E,
    ) -> NormalizedImage
    where
        E: Fn(&DynamicImage) -> Result<Bytes, ImageError>,
    {
        if is_vector(filename, declared_type) {
            return NormalizedImage {
                data,
                content_type: SVG_CONTENT_TYPE,
                extension: ".svg".to_string(),
            };
        }

        let img = match decode(&data) {
            Ok(img) => img,
            Err(e) => {
                warn!(filename, error = %e, "Image decode failed, storing raw bytes");
                return raw(data, filename);
            }
        };

        let (width, height) = (img.width(), img.height());
        let (target_width, target_height) =
            fit_within(width, height, self.max_width, self.max_height);

        let resized = (target_width, target_height) != (width, height);
        let first_attempt = if resized {
            debug!(
                filename,
                width, height, target_width, target_height, "Downscaling image"
            );
            encode(&img.resize_exact(target_width, target_height, FilterType::CatmullRom))
        } else {
            encode(&img)
        };

        match first_attempt {
            Ok(encoded) => return jpeg(encoded),
            Err(e) if resized => {
                warn!(filename, error = %e, "JPEG encode after resize failed, retrying without resize");
            }
            Err(e) => {
                warn!(filename, error = %e, "JPEG encode failed, storing raw bytes");
                return raw(data, filename);
            }
        }

        match encode(&img) {
            Ok(encoded) => jpeg(encoded),
            Err(e) => {
                warn!(filename, error = %e, "Fallback JPEG encode failed, storing raw bytes");
                raw(data, filename)
            }
        }
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Whether an upload is a vector image.
pub fn is_vector(filename: &str, declared_type: Option<&str>) -> bool {
    declared_type
        .map(|ct| ct.trim().eq_ignore_ascii_case(SVG_CONTENT_TYPE))
        .unwrap_or(false)
        || filename.to_ascii_lowercase().ends_with(".svg")
}

/// Compute the dimensions that fit `width × height` inside the bound.
///
/// Images already inside the bound are returned unchanged; larger images are
/// scaled uniformly by `min(max_w / w, max_h / h)`. Never enlarges, and each
/// dimension is at least 1 pixel.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );

    let scaled = |d: u32, bound: u32| ((d as f64 * scale).round() as u32).clamp(1, bound.max(1));
    (scaled(width, max_width), scaled(height, max_height))
}

/// Extension of `filename` with a leading dot, or `.bin`.
pub fn extension_or_bin(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| ".bin".to_string())
}

fn decode(data: &[u8]) -> Result<DynamicImage, ImageError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()
}

/// Encode as baseline JPEG, dropping any alpha channel.
fn encode_jpeg(img: &DynamicImage) -> Result<Bytes, ImageError> {
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, NORMALIZED_JPEG_QUALITY);

    match img {
        DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray)?,
        DynamicImage::ImageRgb8(rgb) => encoder.encode_image(rgb)?,
        other => encoder.encode_image(&other.to_rgb8())?,
    }

    Ok(Bytes::from(output))
}

fn jpeg(data: Bytes) -> NormalizedImage {
    NormalizedImage {
        data,
        content_type: JPEG_CONTENT_TYPE,
        extension: ".jpeg".to_string(),
    }
}

fn raw(data: Bytes, filename: &str) -> NormalizedImage {
    NormalizedImage {
        data,
        content_type: DEFAULT_CONTENT_TYPE,
        extension: extension_or_bin(filename),
    }
}

// =============================================================================
// Tests
// =============================================================================
