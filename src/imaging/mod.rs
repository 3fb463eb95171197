//! Image normalization for uploads.
//!
//! ```text
//!   raw bytes + filename
//!          │
//!          ▼
//!   ┌──────────────┐  svg   ┌──────────────────────┐
//!   │ vector check ├───────►│ pass through as-is   │
//!   └──────┬───────┘        └──────────────────────┘
//!          │ raster
//!          ▼
//!   ┌──────────────┐  fail  ┌──────────────────────┐
//!   │    decode    ├───────►│ raw, octet-stream    │
//!   └──────┬───────┘        └──────────────────────┘
//!          ▼
//!   ┌──────────────┐  fail  ┌──────────────────────┐  fail
//!   │ fit + encode ├───────►│ encode original      ├───────► raw
//!   └──────┬───────┘        └──────────┬───────────┘
//!          ▼                           ▼
//!      image/jpeg                  image/jpeg
//! ```

mod normalizer;

pub use normalizer::{
    extension_or_bin, fit_within, is_vector, ImageNormalizer, NormalizedImage, JPEG_CONTENT_TYPE,
    MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH, NORMALIZED_JPEG_QUALITY, SVG_CONTENT_TYPE,
};
