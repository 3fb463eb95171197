//! Configuration management for the object relay.
//!
//! Options come from command-line arguments, environment variables with the
//! `RELAY_` prefix, or defaults.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use object_relay::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_HOST` - Server bind address (default: 0.0.0.0)
//! - `RELAY_PORT` - Server port (default: 8080)
//! - `RELAY_S3_BUCKET` - Primary bucket (default: mybucket)
//! - `RELAY_S3_ENDPOINT` - Custom endpoint for S3-compatible services
//! - `RELAY_S3_REGION` - AWS region (default: us-east-1)
//! - `RELAY_S3_ACCESS_KEY` / `RELAY_S3_SECRET_KEY` - Static credentials
//! - `RELAY_S3_USE_SSL` - Scheme for scheme-less endpoints (default: false)
//! - `RELAY_IMAGES_BUCKET` - Images bucket (default: kzen-storage)
//! - `RELAY_IMAGES_PREFIX` - Image upload namespace (default: /kzen)
//! - `RELAY_API_KEY` - API key for mutating requests
//! - `RELAY_MAX_FORM_BYTES` - Request body limit (default: 50 MiB)
//! - `RELAY_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use clap::Parser;

use crate::server::DEFAULT_MAX_FORM_BYTES;
use crate::store::S3ClientOptions;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default primary bucket.
pub const DEFAULT_BUCKET: &str = "mybucket";

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default images bucket.
pub const DEFAULT_IMAGES_BUCKET: &str = "kzen-storage";

/// Default image upload namespace.
pub const DEFAULT_IMAGES_PREFIX: &str = "/kzen";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Object Relay - an HTTP front for S3-compatible object storage.
///
/// Serves single objects, concurrent batch fetch/upload/delete and image
/// uploads with normalization.
#[derive(Parser, Debug, Clone)]
#[command(name = "object-relay")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RELAY_PORT")]
    pub port: u16,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// Primary bucket, served under /objects and /batch.
    #[arg(long, default_value = DEFAULT_BUCKET, env = "RELAY_S3_BUCKET")]
    pub s3_bucket: String,

    /// Custom S3 endpoint for S3-compatible services (MinIO, etc.).
    ///
    /// May omit the scheme (`host:9000`); see --s3-use-ssl.
    #[arg(long, env = "RELAY_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "RELAY_S3_REGION")]
    pub s3_region: String,

    /// Static access key. The default credential chain is used when unset.
    #[arg(long, env = "RELAY_S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,

    /// Static secret key.
    #[arg(long, env = "RELAY_S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,

    /// Use https for endpoints given without a scheme.
    #[arg(long, default_value_t = false, env = "RELAY_S3_USE_SSL")]
    pub s3_use_ssl: bool,

    // =========================================================================
    // Images Configuration
    // =========================================================================
    /// Bucket behind the /{images-bucket}-... routes.
    #[arg(long, default_value = DEFAULT_IMAGES_BUCKET, env = "RELAY_IMAGES_BUCKET")]
    pub images_bucket: String,

    /// Namespace prefix for uploaded images.
    #[arg(long, default_value = DEFAULT_IMAGES_PREFIX, env = "RELAY_IMAGES_PREFIX")]
    pub images_prefix: String,

    // =========================================================================
    // Request Configuration
    // =========================================================================
    /// API key required on mutating requests.
    ///
    /// When unset, every request is allowed.
    #[arg(long, env = "RELAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FORM_BYTES, env = "RELAY_MAX_FORM_BYTES")]
    pub max_form_bytes: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "RELAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.trim().is_empty() {
            return Err("S3 bucket name is required. Set --s3-bucket or RELAY_S3_BUCKET".to_string());
        }

        if self.images_bucket.trim().is_empty() {
            return Err(
                "Images bucket name is required. Set --images-bucket or RELAY_IMAGES_BUCKET"
                    .to_string(),
            );
        }

        if self.s3_access_key.is_some() != self.s3_secret_key.is_some() {
            return Err(
                "S3 access key and secret key must be set together \
                 (--s3-access-key and --s3-secret-key)"
                    .to_string(),
            );
        }

        if self.max_form_bytes == 0 {
            return Err("max_form_bytes must be greater than 0".to_string());
        }

        if matches!(self.api_key.as_deref(), Some(key) if key.trim().is_empty()) {
            return Err("API key must not be empty. Unset --api-key to disable the gate".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Options for building the S3 client.
    pub fn s3_options(&self) -> S3ClientOptions {
        S3ClientOptions {
            endpoint: self.s3_endpoint.clone().filter(|e| !e.trim().is_empty()),
            region: self.s3_region.clone(),
            access_key: self.s3_access_key.clone(),
            secret_key: self.s3_secret_key.clone(),
            use_ssl: self.s3_use_ssl,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
