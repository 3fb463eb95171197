//! HTTP server layer for the object relay.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        /objects/{*key}   /batch   /{images}-upload-images       │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌────────┐  │
//! │  │  handlers   │  │    batch    │  │    auth     │  │ routes │  │
//! │  │ (objects)   │  │ (batches)   │  │  (API key)  │  │        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod batch;
pub mod handlers;
pub mod routes;

pub use auth::{api_key_middleware, ApiKeyAuth, AuthError, API_KEY_HEADER};
pub use batch::{
    batch_delete_handler, batch_fetch_handler, batch_upload_handler, upload_images_handler,
    BatchQueryParams, MessageResponse, UploadImagesError,
};
pub use handlers::{
    delete_object_handler, get_object_handler, health_handler, list_handler, put_object_handler,
    AppState, DeleteObjectResponse, ErrorResponse, HealthResponse, ListQueryParams, ListResponse,
    ObjectError, PutObjectResponse, RequestTimeouts, STORE_ERROR_HEADER,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_FORM_BYTES};
