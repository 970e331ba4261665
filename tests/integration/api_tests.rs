//! API integration tests for the proxied endpoints.
//!
//! Tests verify:
//! - Prompt submission is relayed with the gateway's session id
//! - History lookups and their not-found mappings
//! - Image downloads with extension-based content types
//! - HTTP response codes and error bodies

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use super::test_utils::{
    authed_get, authed_post_json, body_json, gateway, MockBackend, MockIdentityProvider,
    MOCK_IMAGE_BYTES, TEST_PROMPT_ID, TEST_TOKEN,
};

// =============================================================================
// Queue Prompt
// =============================================================================

#[tokio::test]
async fn test_queue_prompt_success() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let workflow = json!({
        "3": {"class_type": "KSampler", "inputs": {"seed": 42, "steps": 20}},
        "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "v1-5.safetensors"}}
    });
    let request = authed_post_json("/api/v1/queue_prompt", &json!({ "prompt": workflow }));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["prompt_id"], TEST_PROMPT_ID);
    assert_eq!(body["number"], 7);
    // Empty node errors are omitted
    assert!(body.get("node_errors").is_none());

    // Graph forwarded verbatim, tagged with the gateway's session id
    let prompts = backend.prompts().await;
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0]["prompt"], workflow);
    assert_eq!(prompts[0]["client_id"], "gateway-session");
}

#[tokio::test]
async fn test_queue_prompt_null_node_errors() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let workflow = json!({"sparse": {"class_type": "SaveImage", "inputs": {}}});
    let request = authed_post_json("/api/v1/queue_prompt", &json!({ "prompt": workflow }));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["prompt_id"], TEST_PROMPT_ID);
    assert!(body.get("node_errors").is_none());
}

#[tokio::test]
async fn test_queue_prompt_invalid_json() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/queue_prompt")
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid request body");
    assert!(body["details"].is_string());
    assert!(backend.prompts().await.is_empty());
}

#[tokio::test]
async fn test_queue_prompt_missing_prompt_field() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let request = authed_post_json("/api/v1/queue_prompt", &json!({ "workflow": {} }));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queue_prompt_backend_rejection() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let request = authed_post_json(
        "/api/v1/queue_prompt",
        &json!({ "prompt": { "bad": {"class_type": "Nope"} } }),
    );

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to queue prompt");
    let details = body["details"].as_str().unwrap();
    assert!(details.contains("400"), "details: {}", details);
    assert!(details.contains("prompt_outputs_failed_validation"));
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_success() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router.oneshot(authed_get("/api/v1/history/done")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["done"]["status"]["completed"], true);
    assert_eq!(
        body["done"]["outputs"]["9"]["images"][0]["filename"],
        "ComfyUI_00001_.png"
    );
}

#[tokio::test]
async fn test_history_empty_is_not_found() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get("/api/v1/history/pending"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Prompt history not found or empty");
    assert_eq!(body["details"], "prompt_id: pending");
}

#[tokio::test]
async fn test_history_backend_404_is_not_found() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router.oneshot(authed_get("/api/v1/history/gone")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Prompt history not found");
}

#[tokio::test]
async fn test_history_not_found_message_is_not_found() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get("/api/v1/history/vanished"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_backend_failure() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get("/api/v1/history/explode"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to get prompt history");
}

// =============================================================================
// Image
// =============================================================================

#[tokio::test]
async fn test_image_success_infers_content_type() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get(
            "/api/v1/image?filename=ComfyUI_00001_.PNG&subfolder=&type=output",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Backend said application/octet-stream; the gateway ignores it
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], MOCK_IMAGE_BYTES);
}

#[tokio::test]
async fn test_image_content_types() {
    let backend = MockBackend::start().await;

    let cases = [
        ("photo.jpg", "image/jpeg"),
        ("photo.jpeg", "image/jpeg"),
        ("anim.gif", "application/octet-stream"),
        ("pic.webp", "image/webp"),
        ("data.bin", "application/octet-stream"),
    ];

    for (filename, expected) in cases {
        let router = gateway(&backend, MockIdentityProvider::valid());
        let uri = format!("/api/v1/image?filename={}&type=output", filename);
        let response = router.oneshot(authed_get(&uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{}", filename);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            expected,
            "{}",
            filename
        );
    }
}

#[tokio::test]
async fn test_image_missing_params() {
    let backend = MockBackend::start().await;

    for uri in [
        "/api/v1/image",
        "/api/v1/image?filename=a.png",
        "/api/v1/image?type=output",
        "/api/v1/image?filename=&type=output",
    ] {
        let router = gateway(&backend, MockIdentityProvider::valid());
        let response = router.oneshot(authed_get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "Missing required query parameters: filename, type"
        );
    }
}

#[tokio::test]
async fn test_image_not_found() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get("/api/v1/image?filename=missing.png&type=output"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Image not found");
}

#[tokio::test]
async fn test_image_backend_failure() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get("/api/v1/image?filename=boom.png&type=output"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to get image");
    assert!(body["details"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_image_not_found_in_error_text() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    // A 500 whose body mentions "not found" still maps to 404
    let response = router
        .oneshot(authed_get("/api/v1/image?filename=lost.png&type=output"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Image not found");
}

// =============================================================================
// Health and Routing
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let backend = MockBackend::start().await;
    let provider = MockIdentityProvider::valid();
    let counters = provider.counters();
    let router = gateway(&backend, provider);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(counters.introspect(), 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let backend = MockBackend::start().await;
    let router = gateway(&backend, MockIdentityProvider::valid());

    let response = router
        .oneshot(authed_get("/api/v2/history/done"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_backend_unreachable() {
    let auth = comfy_gateway::AuthState::new(
        std::sync::Arc::new(MockIdentityProvider::valid()),
        super::test_utils::TEST_CLIENT_ID,
        None,
    );
    let client = comfy_gateway::BackendClient::new(
        "http://127.0.0.1:1",
        std::time::Duration::from_secs(2),
    )
    .unwrap();
    let router = comfy_gateway::create_router(
        client,
        auth,
        comfy_gateway::RouterConfig::default().with_tracing(false),
    );

    let response = router.oneshot(authed_get("/api/v1/history/done")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to get prompt history");
}
