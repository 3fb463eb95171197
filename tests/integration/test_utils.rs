//! Test utilities for integration tests.
//!
//! This module provides an in-memory [`BlobStore`] with call counters,
//! injectable failures and per-key delays, plus helpers for building
//! multipart requests and reading responses.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use object_relay::error::StoreError;
use object_relay::store::{BlobStore, ObjectMeta, StoredObject};

// =============================================================================
// Mock Blob Store
// =============================================================================

/// An in-memory store keyed by `(bucket, key)`.
///
/// Failures and delays are configured by key and apply in every bucket.
#[derive(Default)]
pub struct MockBlobStore {
    objects: RwLock<HashMap<(String, String), (Bytes, Option<String>)>>,
    failing_puts: HashSet<String>,
    failing_deletes: HashSet<String>,
    failing_stats: HashSet<String>,
    missing_buckets: HashSet<String>,
    delays: HashMap<String, Duration>,
    transient_stat_failures: AtomicUsize,

    pub fetch_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub stat_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object to `bucket`.
    pub fn with_object(
        self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: &str,
    ) -> Self {
        self.objects.try_write().expect("store is not shared yet").insert(
            (bucket.to_string(), key.to_string()),
            (data.into(), Some(content_type.to_string())),
        );
        self
    }

    /// Make puts of `key` fail.
    pub fn with_failing_put(mut self, key: &str) -> Self {
        self.failing_puts.insert(key.to_string());
        self
    }

    /// Make deletes of `key` fail.
    pub fn with_failing_delete(mut self, key: &str) -> Self {
        self.failing_deletes.insert(key.to_string());
        self
    }

    /// Make stats of `key` fail with a non-transient error.
    pub fn with_failing_stat(mut self, key: &str) -> Self {
        self.failing_stats.insert(key.to_string());
        self
    }

    /// Make deletes in `bucket` fail as if the bucket did not exist.
    pub fn with_missing_bucket(mut self, bucket: &str) -> Self {
        self.missing_buckets.insert(bucket.to_string());
        self
    }

    /// Delay every call touching `key`.
    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Answer the next `count` stats with a transient `AccessDenied`.
    pub fn with_transient_stat_failures(self, count: usize) -> Self {
        self.transient_stat_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Stored object, if any.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<(Bytes, Option<String>)> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn puts(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> usize {
        self.stat_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self, key: &str) {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(key).await;

        let (data, content_type) = self
            .object(bucket, key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(StoredObject {
            meta: ObjectMeta {
                size: data.len() as u64,
                content_type,
            },
            data,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(key).await;

        if self.failing_puts.contains(key) {
            return Err(StoreError::S3(format!("put refused: {}", key)));
        }

        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            (data, Some(content_type.to_string())),
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(key).await;

        if self.missing_buckets.contains(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        if self.failing_deletes.contains(key) {
            return Err(StoreError::S3(format!("delete refused: {}", key)));
        }

        match self
            .objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let keys = self.keys(bucket).await;
        Ok(match prefix {
            Some(prefix) => keys.into_iter().filter(|k| k.starts_with(prefix)).collect(),
            None => keys,
        })
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StoreError> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(key).await;

        let transient = self
            .transient_stat_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(StoreError::AccessDenied("Access Denied".to_string()));
        }
        if self.failing_stats.contains(key) {
            return Err(StoreError::S3("InternalError".to_string()));
        }

        let (data, content_type) = self
            .object(bucket, key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(ObjectMeta {
            size: data.len() as u64,
            content_type,
        })
    }
}

// =============================================================================
// Multipart Form Builder
// =============================================================================

/// Builds `multipart/form-data` request bodies.
pub struct FormBuilder {
    boundary: String,
    body: Vec<u8>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self {
            boundary: "test-boundary-7MA4YWxkTrZu0gW".to_string(),
            body: Vec::new(),
        }
    }

    /// Add a text field.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a file part.
    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file_name
            )
            .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Finish the body and wrap it in a request.
    pub fn request(mut self, method: &str, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Read a response body to bytes.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A solid-colour JPEG.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 85)
        .encode_image(&img)
        .unwrap();
    buf
}

/// Split a `multipart/mixed` body into `(name, content type, data)` parts.
pub fn parse_mixed(body: &[u8], boundary: &str) -> Vec<(String, String, Vec<u8>)> {
    let text = String::from_utf8_lossy(body).into_owned();
    let delimiter = format!("--{}", boundary);

    text.split(&delimiter)
        .filter_map(|chunk| {
            let chunk = chunk.strip_prefix("\r\n")?;
            let (head, data) = chunk.split_once("\r\n\r\n")?;
            let data = data.strip_suffix("\r\n").unwrap_or(data);

            let name = head
                .split("name=\"")
                .nth(1)?
                .split('"')
                .next()?
                .to_string();
            let content_type = head
                .lines()
                .find_map(|l| l.strip_prefix("Content-Type: "))?
                .to_string();

            Some((name, content_type, data.as_bytes().to_vec()))
        })
        .collect()
}

/// The boundary parameter of a `Content-Type` header.
pub fn boundary_of(content_type: &str) -> String {
    content_type
        .split("boundary=")
        .nth(1)
        .expect("content type has a boundary")
        .to_string()
}
