//! HTTP request handlers for single objects, health checks and listings.
//!
//! # Endpoints
//!
//! - `GET|HEAD /objects/{*key}` - Download an object
//! - `POST|PUT /objects/{*key}` - Upload an object (raw body or multipart `file`)
//! - `DELETE /objects/{*key}` - Delete an object
//! - `GET /debug/list?prefix=` - List keys
//! - `GET /health` - Health check endpoint
//!
//! Batch endpoints live in [`super::batch`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{rejection::BytesRejection, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::batch::{BatchExecutor, BatchTimeouts, ImageUploadJob, UploadForm};
use crate::error::{RequestError, StoreError};
use crate::store::{stat_with_retry, BlobStore, DEFAULT_CONTENT_TYPE};

/// Header carrying the raw store error on failed reads.
pub const STORE_ERROR_HEADER: &str = "x-store-error";

// =============================================================================
// Application State
// =============================================================================

/// Deadlines for single-object requests and batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub get: Duration,
    pub put: Duration,
    pub delete: Duration,
    pub list: Duration,
    pub batch: BatchTimeouts,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            get: Duration::from_secs(30),
            put: Duration::from_secs(60),
            delete: Duration::from_secs(30),
            list: Duration::from_secs(10),
            batch: BatchTimeouts::default(),
        }
    }
}

/// Shared state of the routes serving one bucket.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: BlobStore> {
    /// The backing store
    pub store: Arc<S>,

    /// Bucket served by these routes
    pub bucket: String,

    /// Namespace prefix for image uploads into this bucket
    pub image_prefix: String,

    pub timeouts: RequestTimeouts,
}

impl<S: BlobStore + 'static> AppState<S> {
    /// Create state serving `bucket`.
    pub fn new(store: Arc<S>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            image_prefix: String::new(),
            timeouts: RequestTimeouts::default(),
        }
    }

    /// Set the image upload namespace prefix.
    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    /// Set custom request deadlines.
    pub fn with_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Same store and settings, different bucket.
    pub fn for_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..self.clone()
        }
    }

    /// Batch executor for this bucket.
    pub fn executor(&self) -> BatchExecutor<S> {
        BatchExecutor::new(Arc::clone(&self.store), self.bucket.clone())
    }

    /// Image upload job for this bucket.
    pub fn image_job(&self) -> ImageUploadJob<S> {
        ImageUploadJob::new(
            self.executor(),
            self.image_prefix.clone(),
            self.timeouts.batch.upload,
        )
    }
}

impl<S: BlobStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bucket: self.bucket.clone(),
            image_prefix: self.image_prefix.clone(),
            timeouts: self.timeouts,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for the listing endpoints.
#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    /// Only list keys starting with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "missing_field")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response of a successful single-object upload.
#[derive(Debug, Serialize)]
pub struct PutObjectResponse {
    pub ok: bool,
    pub key: String,
}

/// Response of a successful single-object delete.
#[derive(Debug, Serialize)]
pub struct DeleteObjectResponse {
    pub ok: bool,
    pub deleted: String,
}

/// Response from the listing endpoints.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub bucket: String,
    pub objects: Vec<String>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log an error response at a level matching its status.
///
/// 5xx at ERROR, 404 at DEBUG (common and expected), other 4xx at WARN.
pub(crate) fn log_error(status: StatusCode, error_type: &str, message: &str) {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }
}

/// Convert RequestError to HTTP response.
///
/// Every request-shape error is a 400.
impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        let error_type = match &self {
            RequestError::MissingField { .. } => "missing_field",
            RequestError::NoKeys => "missing_keys",
            RequestError::EmptyKey => "invalid_key",
            RequestError::CountMismatch { .. } => "count_mismatch",
            RequestError::NotMultipart => "multipart_required",
            RequestError::InvalidMultipart(_) => "invalid_multipart",
        };
        let message = self.to_string();

        log_error(status, error_type, &message);

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// Errors of the single-object endpoints.
///
/// The store error is kept together with the step that produced it, because
/// the same store error maps to different statuses on different steps.
#[derive(Debug)]
pub enum ObjectError {
    Request(RequestError),
    Body(BytesRejection),
    Stat(StoreError),
    Fetch(StoreError),
    Put(StoreError),
    Delete(StoreError),
    List(StoreError),
}

impl From<RequestError> for ObjectError {
    fn from(err: RequestError) -> Self {
        ObjectError::Request(err)
    }
}

impl IntoResponse for ObjectError {
    fn into_response(self) -> Response {
        let (status, error_type, message, store_error) = match self {
            ObjectError::Request(err) => return err.into_response(),
            ObjectError::Body(rejection) => return rejection.into_response(),

            // Reads: the caller only learns found / not found, the store
            // error goes into a header
            ObjectError::Stat(err) if err.is_not_found() => (
                StatusCode::NOT_FOUND,
                "not_found",
                "object not found".to_string(),
                Some(err),
            ),
            ObjectError::Stat(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "stat_failed",
                "failed to get object info".to_string(),
                Some(err),
            ),
            ObjectError::Fetch(err) => (
                StatusCode::NOT_FOUND,
                "not_found",
                "object not found".to_string(),
                Some(err),
            ),

            ObjectError::Put(err) => (
                store_status(&err),
                "upload_failed",
                format!("upload failed: {}", err),
                None,
            ),
            ObjectError::Delete(err) => (
                store_status(&err),
                "delete_failed",
                format!("delete failed: {}", err),
                None,
            ),
            ObjectError::List(err) => (
                store_status(&err),
                "list_failed",
                format!("list failed: {}", err),
                None,
            ),
        };

        match &store_error {
            Some(err) => log_error(status, error_type, &format!("{} ({})", message, err)),
            None => log_error(status, error_type, &message),
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        let mut response = (status, Json(error_response)).into_response();

        if let Some(value) = store_error.and_then(|err| header_value(&err.to_string())) {
            response.headers_mut().insert(STORE_ERROR_HEADER, value);
        }

        response
    }
}

/// Status for a failed store mutation or listing.
fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        StoreError::Connection(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Header-safe rendering of an error message.
fn header_value(message: &str) -> Option<HeaderValue> {
    let sanitized: String = message
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { ' ' })
        .collect();
    HeaderValue::from_str(&sanitized).ok()
}

// =============================================================================
// Helpers
// =============================================================================

/// Run a store call under a deadline.
pub(crate) async fn before<T, F>(deadline: Instant, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    timeout_at(deadline, call)
        .await
        .unwrap_or_else(|_| Err(StoreError::Timeout))
}

/// Reject blank object keys.
fn object_key(key: String) -> Result<String, RequestError> {
    if key.trim().is_empty() {
        Err(RequestError::EmptyKey)
    } else {
        Ok(key)
    }
}

/// Read an upload body: the multipart `file` part, or the raw body.
async fn read_upload(request: Request) -> Result<(Bytes, String), ObjectError> {
    let declared = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty());

    if declared
        .as_deref()
        .is_some_and(|ct| ct.contains("multipart/form-data"))
    {
        let form = UploadForm::read(Multipart::from_request(request, &()).await).await?;
        let part = form
            .files_named("file")
            .next()
            .ok_or(RequestError::MissingField {
                field: "file",
                hint: "multipart upload",
            })?;
        let content_type = part
            .content_type
            .clone()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        return Ok((part.data.clone(), content_type));
    }

    let data = Bytes::from_request(request, &())
        .await
        .map_err(ObjectError::Body)?;
    Ok((
        data,
        declared.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    ))
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle object downloads.
///
/// # Endpoint
///
/// `GET /objects/{*key}` (also `HEAD`)
///
/// The object is stat'ed first (retrying transient access-denied errors),
/// then read in full.
///
/// # Response
///
/// - `200 OK`: object bytes with `Content-Type` and `Content-Length`
/// - `404 Not Found`: object missing, `X-Store-Error` set
/// - `500 Internal Server Error`: stat failed, `X-Store-Error` set
pub async fn get_object_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Path(key): Path<String>,
) -> Result<Response, ObjectError> {
    let key = object_key(key)?;
    let deadline = Instant::now() + state.timeouts.get;

    let meta = before(deadline, stat_with_retry(state.store.as_ref(), &state.bucket, &key))
        .await
        .map_err(ObjectError::Stat)?;

    let object = before(deadline, state.store.fetch(&state.bucket, &key))
        .await
        .map_err(ObjectError::Fetch)?;

    debug!(bucket = %state.bucket, key = %key, size = object.data.len(), "Serving object");

    Ok((
        [
            (
                header::CONTENT_TYPE,
                meta.content_type_or_default().to_string(),
            ),
            (header::CONTENT_LENGTH, object.data.len().to_string()),
        ],
        Body::from(object.data),
    )
        .into_response())
}

/// Handle object uploads.
///
/// # Endpoint
///
/// `POST /objects/{*key}` or `PUT /objects/{*key}`
///
/// A `multipart/form-data` body must carry the object in its `file` part;
/// any other body is stored as-is with the request's `Content-Type`.
///
/// # Response
///
/// `201 Created` with `{"ok": true, "key": "<key>"}`
pub async fn put_object_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Path(key): Path<String>,
    request: Request,
) -> Result<(StatusCode, Json<PutObjectResponse>), ObjectError> {
    let key = object_key(key)?;
    let (data, content_type) = read_upload(request).await?;
    let size = data.len();

    let deadline = Instant::now() + state.timeouts.put;
    before(
        deadline,
        state.store.put(&state.bucket, &key, data, &content_type),
    )
    .await
    .map_err(ObjectError::Put)?;

    info!(bucket = %state.bucket, key = %key, size, content_type = %content_type, "Object stored");

    Ok((
        StatusCode::CREATED,
        Json(PutObjectResponse { ok: true, key }),
    ))
}

/// Handle object deletes.
///
/// # Endpoint
///
/// `DELETE /objects/{*key}`
///
/// Deleting a missing object succeeds.
pub async fn delete_object_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteObjectResponse>, ObjectError> {
    let key = object_key(key)?;
    let deadline = Instant::now() + state.timeouts.delete;

    match before(deadline, state.store.delete(&state.bucket, &key)).await {
        Ok(()) => info!(bucket = %state.bucket, key = %key, "Object deleted"),
        Err(StoreError::NotFound(_)) => {
            debug!(bucket = %state.bucket, key = %key, "Object already absent")
        }
        Err(e) => return Err(ObjectError::Delete(e)),
    }

    Ok(Json(DeleteObjectResponse {
        ok: true,
        deleted: key,
    }))
}

/// Handle requests to an object route without a key.
pub async fn missing_key_handler() -> RequestError {
    RequestError::EmptyKey
}

/// Handle key listing requests.
///
/// # Endpoint
///
/// `GET /debug/list?prefix=<prefix>`
///
/// # Response
///
/// `200 OK` with `{"bucket": "...", "objects": ["key", ...]}`
pub async fn list_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListQueryParams>,
) -> Result<Json<ListResponse>, ObjectError> {
    let prefix = query.prefix.filter(|p| !p.is_empty());
    info!(bucket = %state.bucket, prefix = ?prefix, "Listing objects");

    let deadline = Instant::now() + state.timeouts.list;
    let objects = before(
        deadline,
        state.store.list(&state.bucket, prefix.as_deref()),
    )
    .await
    .map_err(ObjectError::List)?;

    Ok(Json(ListResponse {
        bucket: state.bucket.clone(),
        objects,
    }))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
