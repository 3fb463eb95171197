use thiserror::Error;

/// Errors returned by the backing object store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The bucket itself does not exist.
    ///
    /// Kept apart from [`StoreError::NotFound`] so that deletes against a
    /// wrong bucket fail instead of counting as already absent.
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Store refused the request.
    ///
    /// MinIO reports this intermittently for objects that exist when many
    /// metadata lookups race, so the single-object read path retries it.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Any other error reported by S3 or an S3-compatible service
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error, including body streaming failures
    #[error("Connection error: {0}")]
    Connection(String),

    /// The operation did not finish before its deadline
    #[error("operation timed out")]
    Timeout,
}

impl StoreError {
    /// Whether this error is the transient permission failure worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::AccessDenied(_))
    }

    /// Whether the store reported the key as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors caused by the shape of a client request.
///
/// These are detected before any store call is made and reject the whole
/// request with a 4xx status.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// A required query parameter or form field is missing or blank
    #[error("{field} is required ({hint})")]
    MissingField {
        field: &'static str,
        hint: &'static str,
    },

    /// Every key in a key list is blank
    #[error("at least one key required")]
    NoKeys,

    /// The object key taken from the request path is empty
    #[error("object key required")]
    EmptyKey,

    /// Number of keys and number of uploaded files differ
    #[error("keys count ({keys}) must match files count ({files})")]
    CountMismatch { keys: usize, files: usize },

    /// The request is expected to be `multipart/form-data`
    #[error("multipart form required")]
    NotMultipart,

    /// The multipart body could not be decoded
    #[error("invalid multipart form: {0}")]
    InvalidMultipart(String),
}
