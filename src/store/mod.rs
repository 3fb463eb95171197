//! Backing object store abstraction.
//!
//! Everything that touches durable storage goes through the [`BlobStore`]
//! trait, so the batch engine and the HTTP handlers can be driven by the
//! S3 implementation in production and by in-memory stores in tests.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     HTTP handlers / BatchExecutor       │
//! └────────────────────┬────────────────────┘
//!                      │  Arc<S: BlobStore>
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              S3BlobStore                │
//! │   (aws-sdk-s3, MinIO or AWS S3)         │
//! └─────────────────────────────────────────┘
//! ```

mod s3;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;

pub use s3::{create_s3_client, normalize_endpoint, S3BlobStore, S3ClientOptions};

/// Content type used when neither the client nor the store supplies one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Number of stat attempts on the single-object read path.
pub const STAT_ATTEMPTS: u32 = 3;

/// Fixed delay between stat attempts.
pub const STAT_RETRY_DELAY: Duration = Duration::from_millis(50);

// =============================================================================
// Types
// =============================================================================

/// Object metadata as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object size in bytes
    pub size: u64,

    /// Content type recorded at upload time, if any
    pub content_type: Option<String>,
}

impl ObjectMeta {
    /// Content type, falling back to `application/octet-stream`.
    pub fn content_type_or_default(&self) -> &str {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() => ct,
            _ => DEFAULT_CONTENT_TYPE,
        }
    }
}

/// A fully read object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub meta: ObjectMeta,
}

// =============================================================================
// BlobStore Trait
// =============================================================================

/// Bucket + key addressed blob storage.
///
/// Implementations must be safe for concurrent use: one handle is shared by
/// every task of a batch.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a whole object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;

    /// Write an object, replacing any existing one.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Remove an object.
    ///
    /// Stores that can tell return [`StoreError::NotFound`] for missing keys;
    /// callers treat that as an already-completed delete.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// List every key under `prefix` (recursive).
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError>;

    /// Read object metadata without the body.
    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StoreError>;
}

/// Stat an object, retrying the transient access-denied failure.
///
/// Up to [`STAT_ATTEMPTS`] attempts with [`STAT_RETRY_DELAY`] between them.
/// Any other error is returned after the first attempt.
pub async fn stat_with_retry<S>(store: &S, bucket: &str, key: &str) -> Result<ObjectMeta, StoreError>
where
    S: BlobStore + ?Sized,
{
    let mut attempt = 1;
    loop {
        match store.stat(bucket, key).await {
            Ok(meta) => return Ok(meta),
            Err(e) if e.is_transient() && attempt < STAT_ATTEMPTS => {
                debug!(bucket, key, attempt, error = %e, "Transient stat failure, retrying");
                attempt += 1;
                tokio::time::sleep(STAT_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Join key segments with `/`.
///
/// Leading and trailing separators of every segment are dropped, empty
/// segments are skipped and runs of `/` inside a segment collapse to one.
pub fn join_key(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a comma-separated list, trimming every entry.
///
/// Empty entries are kept so positions still line up with other lists.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}
