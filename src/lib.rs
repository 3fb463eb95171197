//! # Object Relay
//!
//! An HTTP front for S3-compatible object storage.
//!
//! Besides plain single-object reads and writes, the relay fans batch
//! requests out to the store concurrently and folds the per-item results back
//! into one response, so a client can move dozens of objects in a single
//! round trip.
//!
//! ## Features
//!
//! - **Batch fetch**: many objects in one `multipart/mixed` response
//! - **Batch upload and delete**: per-item results, one failure never fails the batch
//! - **Image uploads**: fit within 1920×1080 and re-encode as JPEG, placing each
//!   file where the form's metadata says
//! - **Authentication**: optional static API key on mutating requests
//!
//! ## Architecture
//!
//! - [`store`] - `BlobStore` trait and its S3 implementation
//! - [`imaging`] - Image normalization
//! - [`batch`] - Batch items, executor, form parsing, destination resolution and response assembly
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use object_relay::{create_router, create_s3_client, RouterConfig, S3BlobStore, S3ClientOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = S3ClientOptions {
//!         endpoint: Some("localhost:9000".to_string()),
//!         region: "us-east-1".to_string(),
//!         access_key: Some("minioadmin".to_string()),
//!         secret_key: Some("minioadmin".to_string()),
//!         use_ssl: false,
//!     };
//!     let store = Arc::new(S3BlobStore::new(create_s3_client(&options).await));
//!
//!     let router = create_router(store, RouterConfig::new("mybucket", "kzen-storage"));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod imaging;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use batch::{
    BatchExecutor, BatchItem, BatchKind, BatchOutcome, BatchTimeouts, ImageUploadJob, ItemResult,
    UploadForm,
};
pub use config::Config;
pub use error::{RequestError, StoreError};
pub use imaging::ImageNormalizer;
pub use server::{create_router, AppState, RouterConfig};
pub use store::{create_s3_client, BlobStore, ObjectMeta, S3BlobStore, S3ClientOptions, StoredObject};
