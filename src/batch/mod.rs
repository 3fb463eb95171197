//! Batch fetch, upload and delete.
//!
//! A request is decomposed into [`BatchItem`]s, executed concurrently by the
//! [`BatchExecutor`] and folded back into one response.
//!
//! ```text
//!  multipart form ──► UploadForm ──► FormContext (resolver)
//!                                        │
//!                     ImageNormalizer ◄──┤ one target per file
//!                                        ▼
//!                        Vec<BatchItem> ──► BatchExecutor ──► BatchOutcome
//!                                           (task per item,      │
//!                                            shared deadline)    ▼
//!                                                        multipart/mixed
//!                                                        or JSON summary
//! ```

mod executor;
mod form;
mod images;
mod item;
mod resolver;
mod response;

pub use executor::{BatchExecutor, EMPTY_KEY_ERROR, MISSING_PAYLOAD_ERROR};
pub use form::{FilePart, UploadForm, FILE_FIELDS};
pub use images::{ImageUploadError, ImageUploadJob};
pub use item::{BatchItem, BatchKind, BatchOutcome, BatchTimeouts, ItemResult};
pub use resolver::{
    generated_name, is_filename_key, resolve_deletions, DeleteTarget, FormContext, PartRef,
    ResolutionSource, ResolvedTarget, IMAGE_EXTENSIONS, RESERVED_FIELDS,
};
pub use response::{
    assemble_fetch, assemble_fetch_with_boundary, ImageUploadSummary, InsertedImage,
    MultipartBody, MutationEntry, MutationSummary,
};
