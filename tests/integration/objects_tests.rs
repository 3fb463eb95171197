//! Single-object integration tests.
//!
//! Tests verify:
//! - Download with stat retry on transient access-denied errors
//! - Raw and multipart uploads
//! - Deletes, including of missing objects
//! - Listing and the images-bucket routes

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use object_relay::{create_router, RouterConfig};

use super::test_utils::{body_bytes, body_json, FormBuilder, MockBlobStore};

const BUCKET: &str = "mybucket";
const IMAGES_BUCKET: &str = "kzen-storage";

fn config() -> RouterConfig {
    RouterConfig::new(BUCKET, IMAGES_BUCKET)
        .with_images_prefix("/kzen")
        .with_tracing(false)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// =============================================================================
// Download
// =============================================================================

#[tokio::test]
async fn test_get_object() {
    let store = Arc::new(MockBlobStore::new().with_object(
        BUCKET,
        "docs/readme.txt",
        "hello",
        "text/plain",
    ));
    let router = create_router(Arc::clone(&store), config());

    let response = router.oneshot(get("/objects/docs/readme.txt")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.headers()["content-length"], "5");
    assert_eq!(body_bytes(response).await, "hello");
}

#[tokio::test]
async fn test_get_missing_object() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let response = router.oneshot(get("/objects/nope.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-store-error"));
    assert_eq!(store.fetches(), 0);

    let json = body_json(response).await;
    assert_eq!(json["message"], "object not found");
}

#[tokio::test]
async fn test_stat_retries_transient_failures() {
    let store = Arc::new(
        MockBlobStore::new()
            .with_object(BUCKET, "a.jpg", "jpeg bytes", "image/jpeg")
            .with_transient_stat_failures(2),
    );
    let router = create_router(Arc::clone(&store), config());

    let response = router.oneshot(get("/objects/a.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.stats(), 3);
    assert_eq!(body_bytes(response).await, "jpeg bytes");
}

#[tokio::test]
async fn test_stat_gives_up_after_three_transient_failures() {
    let store = Arc::new(
        MockBlobStore::new()
            .with_object(BUCKET, "a.jpg", "jpeg bytes", "image/jpeg")
            .with_transient_stat_failures(5),
    );
    let router = create_router(Arc::clone(&store), config());

    let response = router.oneshot(get("/objects/a.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.stats(), 3);
}

#[tokio::test]
async fn test_stat_does_not_retry_other_errors() {
    let store = Arc::new(
        MockBlobStore::new()
            .with_object(BUCKET, "a.jpg", "jpeg bytes", "image/jpeg")
            .with_failing_stat("a.jpg"),
    );
    let router = create_router(Arc::clone(&store), config());

    let response = router.oneshot(get("/objects/a.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.stats(), 1);
    assert_eq!(
        response.headers()["x-store-error"],
        "S3 error: InternalError"
    );

    let json = body_json(response).await;
    assert_eq!(json["message"], "failed to get object info");
}

#[tokio::test]
async fn test_head_object() {
    let store = Arc::new(MockBlobStore::new().with_object(BUCKET, "a.txt", "abc", "text/plain"));
    let router = create_router(store, config());

    let request = Request::builder()
        .method("HEAD")
        .uri("/objects/a.txt")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-length"], "3");
    assert!(body_bytes(response).await.is_empty());
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_put_raw_body() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = Request::builder()
        .method("PUT")
        .uri("/objects/reports/q1.csv")
        .header("content-type", "text/csv")
        .body(Body::from("a,b\n1,2\n"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["key"], "reports/q1.csv");

    let (data, content_type) = store.object(BUCKET, "reports/q1.csv").await.unwrap();
    assert_eq!(data, "a,b\n1,2\n");
    assert_eq!(content_type.as_deref(), Some("text/csv"));
}

#[tokio::test]
async fn test_post_multipart_file() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .file("file", "photo.png", "image/png", b"png bytes")
        .request("POST", "/objects/photos/p.png");
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let (data, content_type) = store.object(BUCKET, "photos/p.png").await.unwrap();
    assert_eq!(data, "png bytes");
    assert_eq!(content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn test_multipart_upload_without_file_part() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("note", "no file here")
        .request("POST", "/objects/x.bin");
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.puts(), 0);
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = Request::builder()
        .method("PUT")
        .uri("/objects/")
        .body(Body::from("data"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.puts(), 0);
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config().with_max_form_bytes(16));

    let request = Request::builder()
        .method("PUT")
        .uri("/objects/big.bin")
        .body(Body::from(vec![0u8; 64]))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(store.puts(), 0);
}

// =============================================================================
// Delete and List
// =============================================================================

#[tokio::test]
async fn test_delete_object() {
    let store = Arc::new(MockBlobStore::new().with_object(BUCKET, "a.txt", "abc", "text/plain"));
    let router = create_router(Arc::clone(&store), config());

    let request = Request::builder()
        .method("DELETE")
        .uri("/objects/a.txt")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["deleted"], "a.txt");
    assert!(store.object(BUCKET, "a.txt").await.is_none());
}

#[tokio::test]
async fn test_delete_missing_object_succeeds() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(store, config());

    let request = Request::builder()
        .method("DELETE")
        .uri("/objects/never-existed.txt")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_failure_is_server_error() {
    let store = Arc::new(
        MockBlobStore::new()
            .with_object(BUCKET, "a.txt", "abc", "text/plain")
            .with_failing_delete("a.txt"),
    );
    let router = create_router(store, config());

    let request = Request::builder()
        .method("DELETE")
        .uri("/objects/a.txt")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_delete_in_missing_bucket_is_server_error() {
    let store = Arc::new(MockBlobStore::new().with_missing_bucket(BUCKET));
    let router = create_router(store, config());

    let request = Request::builder()
        .method("DELETE")
        .uri("/objects/a.txt")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "delete_failed");
    assert_eq!(json["message"], "delete failed: Bucket not found: mybucket");
}

#[tokio::test]
async fn test_debug_list_with_prefix() {
    let store = Arc::new(
        MockBlobStore::new()
            .with_object(BUCKET, "a/1.txt", "1", "text/plain")
            .with_object(BUCKET, "a/2.txt", "2", "text/plain")
            .with_object(BUCKET, "b/3.txt", "3", "text/plain"),
    );
    let router = create_router(store, config());

    let response = router.oneshot(get("/debug/list?prefix=a/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["bucket"], BUCKET);
    assert_eq!(json["objects"], serde_json::json!(["a/1.txt", "a/2.txt"]));
}

#[tokio::test]
async fn test_images_bucket_routes() {
    let store = Arc::new(
        MockBlobStore::new()
            .with_object(IMAGES_BUCKET, "kzen/p/x.jpg", "img", "image/jpeg")
            .with_object(BUCKET, "kzen/p/x.jpg", "other", "image/jpeg"),
    );
    let router = create_router(Arc::clone(&store), config());

    let response = router
        .clone()
        .oneshot(get("/kzen-storage-objects/kzen/p/x.jpg"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, "img");

    let response = router.oneshot(get("/kzen-storage-debug-list")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["bucket"], IMAGES_BUCKET);
    assert_eq!(json["objects"], serde_json::json!(["kzen/p/x.jpg"]));
}
