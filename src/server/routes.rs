//! Router configuration for the object relay.
//!
//! This module defines the HTTP routes and applies middleware for
//! authentication, body limits, tracing and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /health, /health/                   - Health check (public)
//! /objects/{*key}                     - Single object GET/HEAD/POST/PUT/DELETE
//! /batch                              - Batch GET/POST/DELETE
//! /debug/list                         - List keys
//! /{images-bucket}-objects/{*key}     - Single object, images bucket
//! /{images-bucket}-upload-images      - Image upload job
//! /{images-bucket}-debug-list         - List keys, images bucket
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use object_relay::server::routes::{create_router, RouterConfig};
//! use object_relay::store::S3BlobStore;
//!
//! let store = Arc::new(S3BlobStore::new(client));
//! let config = RouterConfig::new("mybucket", "kzen-storage")
//!     .with_api_key("secret-key")
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(store, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, get, post},
    Router,
};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{api_key_middleware, ApiKeyAuth, API_KEY_HEADER};
use super::batch::{
    batch_delete_handler, batch_fetch_handler, batch_upload_handler, upload_images_handler,
};
use super::handlers::{
    delete_object_handler, get_object_handler, health_handler, list_handler, missing_key_handler,
    put_object_handler, AppState, RequestTimeouts,
};
use crate::store::BlobStore;

/// Default request body limit for uploads (50 MiB).
pub const DEFAULT_MAX_FORM_BYTES: usize = 50 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Bucket behind `/objects`, `/batch` and `/debug/list`
    pub bucket: String,

    /// Bucket behind the `/{images-bucket}-...` routes
    pub images_bucket: String,

    /// Namespace prefix for image uploads
    pub images_prefix: String,

    /// Static API key (None = gate disabled)
    pub api_key: Option<String>,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Maximum accepted request body size in bytes
    pub max_form_bytes: usize,

    pub timeouts: RequestTimeouts,
}

impl RouterConfig {
    /// Create a router configuration for the two buckets.
    ///
    /// By default:
    /// - No API key is required
    /// - CORS allows any origin
    /// - Bodies up to 50 MiB are accepted
    /// - Tracing is enabled
    pub fn new(bucket: impl Into<String>, images_bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            images_bucket: images_bucket.into(),
            images_prefix: String::new(),
            api_key: None,
            cors_origins: None,
            enable_tracing: true,
            max_form_bytes: DEFAULT_MAX_FORM_BYTES,
            timeouts: RequestTimeouts::default(),
        }
    }

    /// Set the namespace prefix for image uploads.
    pub fn with_images_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.images_prefix = prefix.into();
        self
    }

    /// Require `key` on mutating requests.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the request body limit.
    pub fn with_max_form_bytes(mut self, bytes: usize) -> Self {
        self.max_form_bytes = bytes;
        self
    }

    /// Set custom request deadlines.
    pub fn with_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Layers, innermost first: body limit, API key gate (when a key is set),
/// request tracing (when enabled), CORS. CORS stays outermost so rejected
/// requests still carry the CORS headers the browser needs to read them.
pub fn create_router<S>(store: Arc<S>, config: RouterConfig) -> Router
where
    S: BlobStore + 'static,
{
    let primary_state = AppState::new(store, config.bucket.clone()).with_timeouts(config.timeouts);
    let images_state = primary_state
        .for_bucket(config.images_bucket.clone())
        .with_image_prefix(config.images_prefix.clone());

    let primary_routes = object_routes::<S>("/objects")
        .route(
            "/batch",
            get(batch_fetch_handler::<S>)
                .post(batch_upload_handler::<S>)
                .delete(batch_delete_handler::<S>),
        )
        .route("/debug/list", get(list_handler::<S>))
        .with_state(primary_state);

    let images_base = format!("/{}", config.images_bucket);
    let images_routes = object_routes::<S>(&format!("{}-objects", images_base))
        .route(
            &format!("{}-upload-images", images_base),
            post(upload_images_handler::<S>),
        )
        .route(
            &format!("{}-debug-list", images_base),
            get(list_handler::<S>),
        )
        .with_state(images_state);

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/health/", get(health_handler));

    let mut router = Router::new()
        .merge(public_routes)
        .merge(primary_routes)
        .merge(images_routes)
        .layer(DefaultBodyLimit::max(config.max_form_bytes));

    if let Some(key) = &config.api_key {
        router = router.layer(middleware::from_fn_with_state(
            ApiKeyAuth::new(key),
            api_key_middleware,
        ));
    }

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.layer(build_cors_layer(&config))
}

/// Single-object routes under `base`.
fn object_routes<S>(base: &str) -> Router<AppState<S>>
where
    S: BlobStore + 'static,
{
    Router::new()
        // `{*key}` never matches an empty key
        .route(&format!("{}/", base), any(missing_key_handler))
        .route(
            &format!("{}/{{*key}}", base),
            get(get_object_handler::<S>)
                .post(put_object_handler::<S>)
                .put(put_object_handler::<S>)
                .delete(delete_object_handler::<S>),
        )
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
