//! # ComfyUI Gateway
//!
//! An authenticated REST façade in front of a ComfyUI image-generation
//! backend.
//!
//! Callers present a Google OAuth access token; the gateway verifies it with
//! the identity provider and then relays work submissions, history lookups,
//! image downloads and image uploads to the backend.
//!
//! ## Architecture
//!
//! - [`backend`] - HTTP/WebSocket client for the ComfyUI backend
//! - [`server`] - Axum-based HTTP server, bearer-token verification and routes
//! - [`config`] - CLI and configuration types
//! - [`error`] - Backend and identity provider error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use comfy_gateway::{create_router, AuthState, BackendClient, OAuthIdentityProvider, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = BackendClient::new("http://127.0.0.1:8188", Duration::from_secs(60))?;
//!     let provider = OAuthIdentityProvider::google(Duration::from_secs(10))?;
//!     let auth = AuthState::new(Arc::new(provider), "my-client-id", None);
//!
//!     let router = create_router(backend, auth, RouterConfig::default());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use backend::{
    content_type_for, generate_session_id, load_workflow, BackendClient, EventStream,
    PromptReceipt, UploadReceipt, Workflow, DEFAULT_BACKEND_TIMEOUT,
};
pub use config::{Cli, Command, RunMode, ServeConfig, SubmitConfig};
pub use error::{BackendError, ProviderError};
pub use server::{
    auth_middleware, create_router, AppState, AuthError, AuthState, ErrorResponse, Identity,
    IdentityContext, IdentityProvider, OAuthIdentityProvider, RouterConfig,
};
