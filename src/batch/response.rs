//! Aggregate responses for finished batches.
//!
//! Batch fetches are returned as one `multipart/mixed` body with a part per
//! object found. Mutations are summarised as JSON, one entry per submitted
//! item in submission order.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::item::{BatchOutcome, ItemResult};

// =============================================================================
// multipart/mixed
// =============================================================================

/// An assembled `multipart/mixed` body.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub boundary: String,
    pub body: Bytes,

    /// Number of parts written
    pub parts: usize,

    /// Items left out because they failed or were skipped
    pub omitted: usize,
}

impl MultipartBody {
    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }
}

/// Build the response body for a fetch batch.
///
/// Every successful item becomes one part named after its key. Failed items
/// are left out and only counted.
pub fn assemble_fetch(outcome: BatchOutcome) -> MultipartBody {
    assemble_fetch_with_boundary(outcome, Uuid::new_v4().simple().to_string())
}

/// [`assemble_fetch`] with a caller-chosen boundary.
pub fn assemble_fetch_with_boundary(outcome: BatchOutcome, boundary: String) -> MultipartBody {
    let mut body = BytesMut::new();
    let mut parts = 0usize;
    let mut omitted = 0usize;

    for result in outcome.results {
        let ItemResult {
            key,
            ok,
            payload,
            content_type,
            ..
        } = result;

        let Some(payload) = payload.filter(|_| ok) else {
            omitted += 1;
            continue;
        };

        if parts == 0 {
            body.put_slice(format!("--{}\r\n", boundary).as_bytes());
        } else {
            body.put_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        }

        let name = quoted_param(&key);
        body.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, name
            )
            .as_bytes(),
        );
        body.put_slice(
            format!(
                "Content-Type: {}\r\n\r\n",
                header_text(content_type.as_deref().unwrap_or(crate::store::DEFAULT_CONTENT_TYPE))
            )
            .as_bytes(),
        );
        body.put_slice(&payload);
        parts += 1;
    }

    if parts == 0 {
        body.put_slice(format!("--{}--\r\n", boundary).as_bytes());
    } else {
        body.put_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    }

    if omitted > 0 {
        info!(parts, omitted, "Batch fetch omitted failed items");
    } else {
        debug!(parts, "Assembled batch fetch body");
    }

    MultipartBody {
        boundary,
        body: body.freeze(),
        parts,
        omitted,
    }
}

fn quoted_param(s: &str) -> String {
    header_text(s).replace('\\', "\\\\").replace('"', "\\\"")
}

/// Part header text with control characters blanked, so keys carrying CR or
/// LF cannot end the header block early.
fn header_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

// =============================================================================
// JSON summaries
// =============================================================================

/// Per-item entry of a mutation summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationEntry {
    pub key: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ItemResult> for MutationEntry {
    fn from(result: &ItemResult) -> Self {
        Self {
            key: result.key.clone(),
            ok: result.ok,
            error: result.error.clone(),
        }
    }
}

/// Summary of an upload or delete batch.
///
/// Serializes as `{"uploaded": [...]}` or `{"deleted": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationSummary {
    Uploaded(Vec<MutationEntry>),
    Deleted(Vec<MutationEntry>),
}

impl MutationSummary {
    pub fn uploaded(outcome: &BatchOutcome) -> Self {
        Self::Uploaded(outcome.results.iter().map(MutationEntry::from).collect())
    }

    pub fn deleted(outcome: &BatchOutcome) -> Self {
        Self::Deleted(outcome.results.iter().map(MutationEntry::from).collect())
    }

    /// Entries in submission order.
    pub fn entries(&self) -> &[MutationEntry] {
        match self {
            Self::Uploaded(entries) | Self::Deleted(entries) => entries,
        }
    }
}

/// One stored image reported back to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertedImage {
    /// Correlation id (empty when none was supplied)
    pub id: String,

    /// Folder-relative path the image was stored under
    pub img_path: String,
}

/// Response body of the image upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageUploadSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    pub inserted: Vec<InsertedImage>,

    /// Client paths whose objects were actually removed
    pub deleted: Vec<String>,
}

impl ImageUploadSummary {
    /// Summary for a request that carried neither files nor deletions.
    pub fn nothing_to_do() -> Self {
        Self {
            msg: Some("No files to upload or delete".to_string()),
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
