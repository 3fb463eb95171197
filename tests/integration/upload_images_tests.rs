//! Image upload integration tests.
//!
//! Tests verify:
//! - Images are normalized and stored under prefix/folder/destination
//! - Destinations follow the form's placement metadata
//! - Old paths are removed and only really removed paths are reported
//! - Failures answer with a `msg` body

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use object_relay::{create_router, RouterConfig};

use super::test_utils::{body_json, create_test_jpeg, FormBuilder, MockBlobStore};

const IMAGES_BUCKET: &str = "kzen-storage";
const UPLOAD_URI: &str = "/kzen-storage-upload-images";

fn config() -> RouterConfig {
    RouterConfig::new("mybucket", IMAGES_BUCKET)
        .with_images_prefix("/kzen")
        .with_tracing(false)
}

fn jpeg_dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

#[tokio::test]
async fn test_upload_with_filename_map() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("userId", "u1")
        .field("folder", "products")
        .field("photo.jpg", "u1/hero.jpg")
        .field("ids", "row-7")
        .file("files", "photo.jpg", "image/jpeg", &create_test_jpeg(2000, 1500))
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["inserted"][0]["img_path"], "u1/hero.jpg");
    assert_eq!(json["inserted"][0]["id"], "row-7");
    assert_eq!(json["deleted"], serde_json::json!([]));

    let (data, content_type) = store
        .object(IMAGES_BUCKET, "kzen/products/u1/hero.jpg")
        .await
        .unwrap();
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(jpeg_dimensions(&data), (1440, 1080));
}

#[tokio::test]
async fn test_upload_with_new_sources() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("userId", "u1")
        .field("folder", "products")
        .field(
            "newSources",
            r#"[{"id": "r1", "path": "u1/one.jpg"}, {"id": "r2", "path": "u1/two.jpg"}]"#,
        )
        .field("fileIds", "r2,r1")
        .file("files", "a.jpg", "image/jpeg", &create_test_jpeg(10, 10))
        .file("files", "b.jpg", "image/jpeg", &create_test_jpeg(10, 10))
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json["inserted"],
        serde_json::json!([
            {"id": "r2", "img_path": "u1/two.jpg"},
            {"id": "r1", "img_path": "u1/one.jpg"}
        ])
    );
    assert_eq!(
        store.keys(IMAGES_BUCKET).await,
        vec!["kzen/products/u1/one.jpg", "kzen/products/u1/two.jpg"]
    );
}

#[tokio::test]
async fn test_upload_generates_names_without_metadata() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("userId", "u42")
        .field("folder", "gallery")
        .file("files", "a.jpg", "image/jpeg", &create_test_jpeg(800, 600))
        .file("files", "b.jpg", "image/jpeg", &create_test_jpeg(20, 20))
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let inserted = json["inserted"].as_array().unwrap();
    assert_eq!(inserted.len(), 2);

    let first = inserted[0]["img_path"].as_str().unwrap();
    let second = inserted[1]["img_path"].as_str().unwrap();
    assert!(first.starts_with("u42_") && first.ends_with(".jpeg"));
    assert_ne!(first, second);

    let (data, _) = store
        .object(IMAGES_BUCKET, &format!("kzen/gallery/{}", first))
        .await
        .unwrap();
    assert_eq!(jpeg_dimensions(&data), (800, 600));
    assert_eq!(store.keys(IMAGES_BUCKET).await.len(), 2);
}

#[tokio::test]
async fn test_upload_and_delete_old_paths() {
    let store = Arc::new(
        MockBlobStore::new().with_object(IMAGES_BUCKET, "kzen/products/old.jpg", "x", "image/jpeg"),
    );
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("userId", "u1")
        .field("folder", "products")
        .field("imgPathsToDelete", "old.jpg,never-existed.jpg")
        .file("file", "new.jpg", "image/jpeg", &create_test_jpeg(10, 10))
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["deleted"], serde_json::json!(["old.jpg"]));
    assert!(store
        .object(IMAGES_BUCKET, "kzen/products/old.jpg")
        .await
        .is_none());
    assert_eq!(store.deletes(), 2);
}

#[tokio::test]
async fn test_nothing_to_do() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("userId", "u1")
        .field("folder", "products")
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "No files to upload or delete");
    assert_eq!(store.puts(), 0);
    assert_eq!(store.deletes(), 0);
}

#[tokio::test]
async fn test_missing_user_id() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("folder", "products")
        .file("files", "a.jpg", "image/jpeg", &create_test_jpeg(10, 10))
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "upload images: userId is required");
    assert_eq!(store.puts(), 0);
}

#[tokio::test]
async fn test_not_multipart() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(store, config());

    let request = Request::builder()
        .method("POST")
        .uri(UPLOAD_URI)
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "upload images: multipart form required");
}

#[tokio::test]
async fn test_upload_failure_is_server_error() {
    let store = Arc::new(MockBlobStore::new().with_failing_put("kzen/f/u1/fixed.jpg"));
    let router = create_router(Arc::clone(&store), config());

    let request = FormBuilder::new()
        .field("userId", "u1")
        .field("folder", "f")
        .field("imgPath", "u1/fixed.jpg")
        .file("files", "a.jpg", "image/jpeg", &create_test_jpeg(10, 10))
        .request("POST", UPLOAD_URI);
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "upload images: upload error");
}

#[tokio::test]
async fn test_upload_route_only_on_images_bucket() {
    let store = Arc::new(MockBlobStore::new());
    let router = create_router(store, config());

    let request = FormBuilder::new()
        .field("userId", "u1")
        .field("folder", "f")
        .request("POST", "/mybucket-upload-images");
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
