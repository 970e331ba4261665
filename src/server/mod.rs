//! HTTP server layer for the gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        /api/v1/{queue_prompt, history, image, upload_image}     │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────────┐ │
//! │  │    auth     │  │   handlers   │  │        routes           │ │
//! │  │ (bearer/IdP)│─▶│  (requests)  │  │  (router config)        │ │
//! │  └─────────────┘  └──────┬───────┘  └─────────────────────────┘ │
//! └──────────────────────────┼──────────────────────────────────────┘
//!                            ▼
//!                      BackendClient
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{
    auth_middleware, bearer_token, AuthError, AuthState, Identity, IdentityContext,
    IdentityProvider, OAuthIdentityProvider, TokenInfo, UserProfile, GOOGLE_TOKENINFO_URL,
    GOOGLE_USERINFO_URL,
};
pub use handlers::{
    health_handler, history_handler, image_handler, queue_prompt_handler, upload_image_handler,
    ApiError, AppState, ErrorResponse, HealthResponse, ImageQueryParams, QueuePromptRequest,
};
pub use routes::{create_router, RouterConfig, DEFAULT_BASE_PATH, DEFAULT_MAX_UPLOAD_BYTES};
