//! Static API-key gate.
//!
//! When a key is configured, every mutating request must present it, either
//! as `X-API-Key: <key>` or as `Authorization: Bearer <key>`. Reads stay
//! public:
//!
//! | Request                  | Key required |
//! |--------------------------|--------------|
//! | `/health`, `/health/`    | no           |
//! | `OPTIONS` (preflight)    | no           |
//! | `GET`, `HEAD`            | no           |
//! | anything else            | yes          |
//!
//! Keys are compared in constant time.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

// =============================================================================
// Types
// =============================================================================

/// Authentication error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No key in either header
    MissingKey,

    /// A key was sent but does not match
    InvalidKey,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingKey => write!(f, "Missing API key"),
            AuthError::InvalidKey => write!(f, "Invalid API key"),
        }
    }
}

/// Body of a 401 response.
#[derive(Debug, Serialize)]
struct UnauthorizedBody {
    error: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // A wrong key could be probing, a missing one is usually a misconfigured client
        match &self {
            AuthError::InvalidKey => warn!(status = 401, "Authentication failed: {}", self),
            AuthError::MissingKey => debug!(status = 401, "Authentication failed: {}", self),
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(UnauthorizedBody {
                error: "invalid or missing API key",
            }),
        )
            .into_response()
    }
}

// =============================================================================
// API Key Authentication
// =============================================================================

/// Verifies the static API key.
#[derive(Clone)]
pub struct ApiKeyAuth {
    key: Vec<u8>,
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth").finish_non_exhaustive()
    }
}

impl ApiKeyAuth {
    /// Create an authenticator for `key`.
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    /// Check the key presented in `headers`.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = presented_key(headers).ok_or(AuthError::MissingKey)?;

        if presented.as_bytes().ct_eq(&self.key).into() {
            Ok(())
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}

/// Whether a request may skip the key check.
pub fn is_exempt(method: &Method, path: &str) -> bool {
    path == "/health"
        || path == "/health/"
        || method == Method::OPTIONS
        || method == Method::GET
        || method == Method::HEAD
}

/// The key from `X-API-Key`, else from `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    from_header.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|v| !v.is_empty())
    })
}

/// Axum middleware enforcing the API key.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware};
/// use object_relay::server::auth::{ApiKeyAuth, api_key_middleware};
///
/// let auth = ApiKeyAuth::new("secret-key");
/// let app = Router::new()
///     .route("/objects/{*key}", put(put_object))
///     .layer(middleware::from_fn_with_state(auth, api_key_middleware));
/// ```
pub async fn api_key_middleware(
    State(auth): State<ApiKeyAuth>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !is_exempt(request.method(), request.uri().path()) {
        auth.verify(request.headers())?;
    }

    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
