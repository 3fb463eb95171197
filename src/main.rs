//! Object Relay - an HTTP front for S3-compatible object storage.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use object_relay::{
    config::Config,
    server::{create_router, RouterConfig},
    store::{create_s3_client, normalize_endpoint, S3BlobStore},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    log_config(&config);

    let client = create_s3_client(&config.s3_options()).await;
    let store = S3BlobStore::new(client);

    info!("Connecting to S3...");
    if let Err(e) = store.probe(&config.s3_bucket).await {
        error!("  Failed to reach bucket '{}': {}", config.s3_bucket, e);
        error!("  Please check:");
        error!("    - The S3 credentials are correct");
        error!("    - The bucket '{}' exists and is accessible", config.s3_bucket);
        error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
        return ExitCode::FAILURE;
    }
    info!("  Connected successfully");

    // Image routes stay mounted; their requests fail until the bucket exists
    if config.images_bucket != config.s3_bucket {
        if let Err(e) = store.probe(&config.images_bucket).await {
            warn!(
                "Images bucket '{}' is not reachable: {}",
                config.images_bucket, e
            );
        }
    }

    let router = create_router(Arc::new(store), build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Log the effective configuration. Secrets are never printed.
fn log_config(config: &Config) {
    info!("object-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  S3 bucket: {}", config.s3_bucket);
    match config.s3_options().endpoint {
        Some(endpoint) => info!(
            "  S3 endpoint: {}",
            normalize_endpoint(&endpoint, config.s3_use_ssl)
        ),
        None => info!("  S3 endpoint: AWS default"),
    }
    info!("  S3 region: {}", config.s3_region);
    if config.s3_access_key.is_some() {
        info!("  S3 credentials: static");
    } else {
        info!("  S3 credentials: default provider chain");
    }
    info!(
        "  Images: bucket {}, prefix {}",
        config.images_bucket, config.images_prefix
    );
    info!("  Max form size: {} bytes", config.max_form_bytes);

    if config.api_key.is_some() {
        info!("  API key: required for mutating requests");
    } else {
        warn!("  API key: DISABLED - uploads and deletes are open to anyone");
        warn!("           Enable for production: --api-key=<key>");
    }

    match &config.cors_origins {
        Some(origins) => info!("  CORS origins: {}", origins.join(", ")),
        None => info!("  CORS origins: any"),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "object_relay=debug,tower_http=debug"
    } else {
        "object_relay=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new(&config.s3_bucket, &config.images_bucket)
        .with_images_prefix(&config.images_prefix)
        .with_max_form_bytes(config.max_form_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref key) = config.api_key {
        router_config = router_config.with_api_key(key);
    }

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
