//! Upload integration tests.
//!
//! Tests verify:
//! - Form fields are forwarded to the backend unchanged
//! - Required fields are enforced
//! - Scratch files are removed whether the upload succeeds or fails
//! - Oversized bodies are refused with 413

use axum::http::StatusCode;
use tower::ServiceExt;

use comfy_gateway::RouterConfig;

use super::test_utils::{
    body_json, gateway_with, gateway_with_config, MockBackend, MockIdentityProvider,
    MultipartBody,
};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR-upload-test";

fn scratch_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_upload_success() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();
    let router = gateway_with(
        &backend,
        MockIdentityProvider::valid(),
        None,
        Some(scratch.path()),
    );

    let request = MultipartBody::new()
        .text("type", "input")
        .text("overwrite", "true")
        .file("image", "portrait.png", PNG_BYTES)
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "portrait.png");
    assert_eq!(body["type"], "input");
    // Empty subfolder is omitted
    assert!(body.get("subfolder").is_none());

    let uploads = backend.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].filename, "portrait.png");
    assert_eq!(uploads[0].data, PNG_BYTES);
    assert_eq!(uploads[0].kind, "input");
    assert_eq!(uploads[0].overwrite, "true");

    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_upload_overwrite_defaults_to_false() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();

    for overwrite in [None, Some("yes"), Some("TRUE")] {
        let router = gateway_with(
            &backend,
            MockIdentityProvider::valid(),
            None,
            Some(scratch.path()),
        );

        let mut form = MultipartBody::new().text("type", "input");
        if let Some(value) = overwrite {
            form = form.text("overwrite", value);
        }
        let request = form
            .file("image", "mask.png", PNG_BYTES)
            .into_request("/api/v1/upload_image");

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{:?}", overwrite);
    }

    let uploads = backend.uploads().await;
    assert_eq!(uploads.len(), 3);
    assert!(uploads.iter().all(|u| u.overwrite == "false"));
}

#[tokio::test]
async fn test_upload_missing_type() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();
    let router = gateway_with(
        &backend,
        MockIdentityProvider::valid(),
        None,
        Some(scratch.path()),
    );

    let request = MultipartBody::new()
        .file("image", "portrait.png", PNG_BYTES)
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Form field 'type' is required");
    assert!(backend.uploads().await.is_empty());
    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_upload_missing_image() {
    let backend = MockBackend::start().await;
    let router = gateway_with(&backend, MockIdentityProvider::valid(), None, None);

    // A plain text field named "image" is not a file
    let request = MultipartBody::new()
        .text("type", "input")
        .text("image", "not-a-file")
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Form field 'image' (file) is required");
}

#[tokio::test]
async fn test_upload_backend_failure_cleans_up() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();
    let router = gateway_with(
        &backend,
        MockIdentityProvider::valid(),
        None,
        Some(scratch.path()),
    );

    let request = MultipartBody::new()
        .text("type", "broken")
        .file("image", "portrait.png", PNG_BYTES)
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to upload image");
    assert!(body["details"].as_str().unwrap().contains("disk full"));

    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_upload_strips_client_path_from_scratch_name() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();
    let router = gateway_with(
        &backend,
        MockIdentityProvider::valid(),
        None,
        Some(scratch.path()),
    );

    let request = MultipartBody::new()
        .text("type", "input")
        .file("image", "../../etc/portrait.png", PNG_BYTES)
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_upload_large_file_forwarded_intact() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();
    let router = gateway_with(
        &backend,
        MockIdentityProvider::valid(),
        None,
        Some(scratch.path()),
    );

    // Spans many body chunks
    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    let request = MultipartBody::new()
        .text("type", "input")
        .file("image", "large.png", &payload)
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let uploads = backend.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].data.len(), payload.len());
    assert_eq!(uploads[0].data, payload);

    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_upload_too_large_is_413() {
    let backend = MockBackend::start().await;
    let scratch = tempfile::tempdir().unwrap();
    let config = RouterConfig::default()
        .with_tracing(false)
        .with_max_upload_bytes(1024)
        .with_upload_dir(scratch.path());
    let router = gateway_with_config(&backend, MockIdentityProvider::valid(), None, config);

    let request = MultipartBody::new()
        .text("type", "input")
        .file("image", "huge.png", &[0x42; 8 * 1024])
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Upload exceeds the maximum allowed size");

    assert!(backend.uploads().await.is_empty());
    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_upload_receipt_with_null_fields() {
    let backend = MockBackend::start().await;
    let router = gateway_with(&backend, MockIdentityProvider::valid(), None, None);

    let request = MultipartBody::new()
        .text("type", "sparse")
        .file("image", "portrait.png", PNG_BYTES)
        .into_request("/api/v1/upload_image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "portrait.png");
    assert!(body.get("subfolder").is_none());
    assert!(body.get("type").is_none());
}
