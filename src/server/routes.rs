//! Router configuration for the gateway.
//!
//! # Route Structure
//!
//! ```text
//! /health                              - Health check (public)
//! {base}/queue_prompt        POST      - Queue a workflow (protected)
//! {base}/history/{prompt_id} GET       - Prompt history (protected)
//! {base}/image               GET       - Download an image (protected)
//! {base}/upload_image        POST      - Upload an image (protected)
//! ```
//!
//! `{base}` defaults to `/api/v1`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use comfy_gateway::backend::{BackendClient, DEFAULT_BACKEND_TIMEOUT};
//! use comfy_gateway::server::{create_router, AuthState, OAuthIdentityProvider, RouterConfig};
//!
//! let backend = BackendClient::new("http://127.0.0.1:8188", DEFAULT_BACKEND_TIMEOUT)?;
//! let provider = OAuthIdentityProvider::google(Duration::from_secs(10))?;
//! let auth = AuthState::new(Arc::new(provider), "my-client-id", None);
//!
//! let router = create_router(backend, auth, RouterConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, AuthState};
use super::handlers::{
    health_handler, history_handler, image_handler, queue_prompt_handler, upload_image_handler,
    AppState,
};
use crate::backend::BackendClient;

/// Default base path for the API routes.
pub const DEFAULT_BASE_PATH: &str = "/api/v1";

/// Default upload size limit (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Prefix for the protected API routes
    pub base_path: String,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Maximum accepted request body size for uploads
    pub max_upload_bytes: usize,

    /// Directory for temporary upload files
    pub upload_dir: Option<PathBuf>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            cors_origins: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_dir: None,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Mount the API under `base_path`. `""` or `"/"` mounts at the root.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Base path without a trailing slash; empty means the root.
    fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Every API route sits behind [`auth_middleware`]; only `/health` is public.
pub fn create_router(backend: BackendClient, auth: AuthState, config: RouterConfig) -> Router {
    let app_state = AppState::new(backend).with_upload_dir(config.upload_dir.clone());

    let api_routes = Router::new()
        .route("/queue_prompt", post(queue_prompt_handler))
        .route("/history/{prompt_id}", get(history_handler))
        .route("/image", get(image_handler))
        .route(
            "/upload_image",
            post(upload_image_handler).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(auth, auth_middleware));

    let base_path = config.normalized_base_path();
    let router = if base_path.is_empty() {
        Router::new().merge(api_routes)
    } else {
        Router::new().nest(&base_path, api_routes)
    };

    let router = router
        .route("/health", get(health_handler))
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

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
