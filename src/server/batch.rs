//! HTTP handlers for batch operations and image uploads.
//!
//! # Endpoints
//!
//! - `GET /batch?keys=a,b` - Fetch many objects as `multipart/mixed`
//! - `POST /batch` - Upload many objects (`keys` + `files` form fields)
//! - `DELETE /batch?keys=a,b` - Delete many objects
//! - `POST /{images-bucket}-upload-images` - Normalize and store images
//!
//! Per-item failures never fail a batch request: the response reports them
//! item by item with a 200 status.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::handlers::{log_error, AppState};
use crate::batch::{
    assemble_fetch, BatchItem, BatchKind, ImageUploadError, ImageUploadSummary, MutationSummary,
    UploadForm,
};
use crate::error::RequestError;
use crate::store::{split_list, BlobStore};

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for batch fetch and delete.
#[derive(Debug, Deserialize)]
pub struct BatchQueryParams {
    /// Comma-separated object keys
    #[serde(default)]
    pub keys: Option<String>,
}

impl BatchQueryParams {
    /// The requested keys, in order.
    ///
    /// Blank entries are kept so results line up with the request; a list
    /// with no usable key at all is rejected.
    pub fn keys(&self) -> Result<Vec<String>, RequestError> {
        let raw = self
            .keys
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(RequestError::MissingField {
                field: "keys",
                hint: "e.g. ?keys=a.jpg,b.jpg",
            })?;
        parse_keys(raw)
    }
}

fn parse_keys(raw: &str) -> Result<Vec<String>, RequestError> {
    let keys = split_list(raw);
    if keys.iter().all(|k| k.is_empty()) {
        return Err(RequestError::NoKeys);
    }
    Ok(keys)
}

// =============================================================================
// Batch Handlers
// =============================================================================

/// Handle batch fetch requests.
///
/// # Endpoint
///
/// `GET /batch?keys=a.jpg,b.jpg`
///
/// # Response
///
/// `200 OK` with a `multipart/mixed` body holding one part per object that
/// could be read. Each part carries
/// `Content-Disposition: form-data; name="<key>"; filename="<key>"` and the
/// object's `Content-Type`. Missing objects are left out.
pub async fn batch_fetch_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<BatchQueryParams>,
) -> Result<Response, RequestError> {
    let items = query.keys()?.into_iter().map(BatchItem::keyed).collect();

    let deadline = state.timeouts.batch.deadline(BatchKind::Fetch);
    let outcome = state.executor().run(BatchKind::Fetch, items, deadline).await;
    let body = assemble_fetch(outcome);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, body.content_type())],
        body.body,
    )
        .into_response())
}

/// Handle batch upload requests.
///
/// # Endpoint
///
/// `POST /batch` with `multipart/form-data`:
///
/// - `keys`: comma-separated object keys
/// - `files` (or `file`): one file per key, in the same order
///
/// # Response
///
/// `200 OK` with `{"uploaded": [{"key": "...", "ok": true}, ...]}`
///
/// # Errors
///
/// - `400 Bad Request`: not multipart, missing `keys`, or key/file count mismatch
pub async fn batch_upload_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MutationSummary>, RequestError> {
    let form = UploadForm::read(multipart).await?;

    let raw_keys = form.value("keys").ok_or(RequestError::MissingField {
        field: "keys",
        hint: "comma-separated object keys",
    })?;
    let keys = split_list(raw_keys);

    let mut files: Vec<_> = form.files_named("files").collect();
    if files.is_empty() {
        files = form.files_named("file").collect();
    }
    if files.len() != keys.len() {
        return Err(RequestError::CountMismatch {
            keys: keys.len(),
            files: files.len(),
        });
    }

    let items = keys
        .into_iter()
        .zip(files)
        .map(|(key, file)| {
            BatchItem::upload(
                key,
                file.data.clone(),
                file.content_type.as_deref().unwrap_or(""),
            )
        })
        .collect();

    let deadline = state.timeouts.batch.deadline(BatchKind::Upload);
    let outcome = state.executor().run(BatchKind::Upload, items, deadline).await;

    Ok(Json(MutationSummary::uploaded(&outcome)))
}

/// Handle batch delete requests.
///
/// # Endpoint
///
/// `DELETE /batch?keys=a.jpg,b.jpg`
///
/// # Response
///
/// `200 OK` with `{"deleted": [{"key": "...", "ok": true}, ...]}`. Keys that
/// did not exist are reported as deleted.
pub async fn batch_delete_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<BatchQueryParams>,
) -> Result<Json<MutationSummary>, RequestError> {
    let items = query.keys()?.into_iter().map(BatchItem::keyed).collect();

    let deadline = state.timeouts.batch.deadline(BatchKind::Delete);
    let outcome = state.executor().run(BatchKind::Delete, items, deadline).await;

    Ok(Json(MutationSummary::deleted(&outcome)))
}

// =============================================================================
// Image Upload
// =============================================================================

/// Body of a failed image upload.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

/// Errors of the image upload endpoint.
#[derive(Debug)]
pub enum UploadImagesError {
    /// The form could not be read
    Form(RequestError),

    /// The job rejected the form or failed
    Job(ImageUploadError),
}

impl From<RequestError> for UploadImagesError {
    fn from(err: RequestError) -> Self {
        UploadImagesError::Form(err)
    }
}

impl From<ImageUploadError> for UploadImagesError {
    fn from(err: ImageUploadError) -> Self {
        UploadImagesError::Job(err)
    }
}

impl IntoResponse for UploadImagesError {
    fn into_response(self) -> Response {
        let (status, error_type, msg) = match &self {
            UploadImagesError::Form(err) => (
                StatusCode::BAD_REQUEST,
                "invalid_form",
                format!("upload images: {}", err),
            ),
            UploadImagesError::Job(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, "invalid_form", err.to_string())
            }
            UploadImagesError::Job(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upload_images_failed",
                err.to_string(),
            ),
        };

        log_error(status, error_type, &msg);
        (status, Json(MessageResponse { msg })).into_response()
    }
}

/// Handle image upload requests.
///
/// # Endpoint
///
/// `POST /{images-bucket}-upload-images` with `multipart/form-data`:
///
/// - `userId`, `folder`: required
/// - `files` / `file` / `binary`: images to store
/// - `imgPathsToDelete`: comma-separated paths to remove
/// - placement metadata (`newSources`, `attachedFiles`, `imgPaths`, `ids`,
///   filename fields, ...), see [`crate::batch::FormContext`]
///
/// # Response
///
/// `200 OK` with `{"inserted": [{"id": "...", "img_path": "..."}], "deleted": [...]}`
///
/// # Errors
///
/// - `400 Bad Request`: unreadable form, missing `userId` or `folder`
/// - `500 Internal Server Error`: an upload or delete failed
pub async fn upload_images_handler<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageUploadSummary>, UploadImagesError> {
    let form = UploadForm::read(multipart).await?;
    let summary = state.image_job().run(form).await?;
    Ok(Json(summary))
}

// =============================================================================
// Tests
// =============================================================================
