use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::store::DEFAULT_CONTENT_TYPE;

// =============================================================================
// Batch Kind
// =============================================================================

/// The store operation every item of a batch performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Fetch,
    Upload,
    Delete,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Fetch => write!(f, "fetch"),
            BatchKind::Upload => write!(f, "upload"),
            BatchKind::Delete => write!(f, "delete"),
        }
    }
}

/// Deadline budgets per batch kind.
///
/// Fetch and delete batches move little data; uploads carry whole payloads
/// and get the long budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTimeouts {
    pub fetch: Duration,
    pub upload: Duration,
    pub delete: Duration,
}

impl Default for BatchTimeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(60),
            upload: Duration::from_secs(120),
            delete: Duration::from_secs(60),
        }
    }
}

impl BatchTimeouts {
    /// Budget for a batch of the given kind.
    pub fn budget(&self, kind: BatchKind) -> Duration {
        match kind {
            BatchKind::Fetch => self.fetch,
            BatchKind::Upload => self.upload,
            BatchKind::Delete => self.delete,
        }
    }

    /// Deadline for a batch of the given kind starting now.
    pub fn deadline(&self, kind: BatchKind) -> Instant {
        Instant::now() + self.budget(kind)
    }
}

// =============================================================================
// Batch Item
// =============================================================================

/// One unit of work in a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Fully qualified object key
    pub key: String,

    /// Opaque client token echoed back in the result
    pub correlation_id: Option<String>,

    /// Bytes to upload (upload batches only)
    pub payload: Option<Bytes>,

    /// Content type to upload with
    pub content_type: String,
}

impl BatchItem {
    /// An item that reads or deletes `key`.
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            correlation_id: None,
            payload: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// An item that uploads `payload` to `key`.
    ///
    /// An empty content type falls back to `application/octet-stream`.
    pub fn upload(key: impl Into<String>, payload: Bytes, content_type: &str) -> Self {
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };

        Self {
            key: key.into(),
            correlation_id: None,
            payload: Some(payload),
            content_type: content_type.to_string(),
        }
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Whether the item has no usable key and must not be launched.
    pub fn is_blank(&self) -> bool {
        self.key.trim().is_empty()
    }
}

// =============================================================================
// Item Result
// =============================================================================

/// Outcome of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub key: String,
    pub correlation_id: Option<String>,
    pub ok: bool,
    pub error: Option<String>,

    /// Object bytes (fetch only)
    pub payload: Option<Bytes>,

    /// Object content type (fetch only)
    pub content_type: Option<String>,

    /// The store reported the key as already missing (delete only)
    pub absent: bool,
}

impl ItemResult {
    /// A successful upload or delete.
    pub fn succeeded(key: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            key: key.into(),
            correlation_id,
            ok: true,
            error: None,
            payload: None,
            content_type: None,
            absent: false,
        }
    }

    /// A successful fetch.
    pub fn fetched(
        key: impl Into<String>,
        correlation_id: Option<String>,
        payload: Bytes,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            payload: Some(payload),
            content_type: Some(content_type.into()),
            ..Self::succeeded(key, correlation_id)
        }
    }

    /// A delete of a key that did not exist.
    pub fn already_absent(key: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            absent: true,
            ..Self::succeeded(key, correlation_id)
        }
    }

    /// A failed item.
    pub fn failed(
        key: impl Into<String>,
        correlation_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            correlation_id,
            ok: false,
            error: Some(error.into()),
            payload: None,
            content_type: None,
            absent: false,
        }
    }
}

// =============================================================================
// Batch Outcome
// =============================================================================

/// All results of one batch, index-aligned with its items.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub kind: BatchKind,
    pub results: Vec<ItemResult>,
}

impl BatchOutcome {
    /// Number of items that failed.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }

    /// Whether every item succeeded.
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }

    /// Iterate over failed items.
    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.results.iter().filter(|r| !r.ok)
    }
}
