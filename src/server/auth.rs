//! Bearer-token authentication against an OAuth2 identity provider.
//!
//! Every protected request goes through two remote checks:
//!
//! ```text
//! Authorization: Bearer <token>
//!        │
//!        ▼
//! ┌──────────────────┐  audience == client id?  expires_in > 0?
//! │  token introspect │ ─────────────────────────────────────────▶ 401
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐  provider trouble
//! │  profile lookup  │ ─────────────────▶ 500
//! └────────┬─────────┘
//!          ▼
//!   hosted domain == allowed domain? ──────────────────────────────▶ 403
//!          │
//!          ▼
//!   IdentityContext attached to the request
//! ```
//!
//! The provider is reached through the [`IdentityProvider`] trait. The
//! production implementation, [`OAuthIdentityProvider`], speaks Google's
//! OAuth2 v2 `tokeninfo` and `userinfo` endpoints.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{middleware, Router};
//! use comfy_gateway::server::auth::{auth_middleware, AuthState, OAuthIdentityProvider};
//!
//! let provider = OAuthIdentityProvider::google(Duration::from_secs(10))?;
//! let auth = AuthState::new(Arc::new(provider), "my-client-id.apps.googleusercontent.com", None);
//! let app = Router::new()
//!     .route("/history/{prompt_id}", get(history_handler))
//!     .layer(middleware::from_fn_with_state(auth, auth_middleware));
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::Url;

use super::handlers::ErrorResponse;
use crate::error::ProviderError;

/// Google OAuth2 v2 token introspection endpoint.
pub const GOOGLE_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/tokeninfo";

/// Google OAuth2 v2 profile endpoint.
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

// =============================================================================
// Provider Types
// =============================================================================

/// Result of token introspection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenInfo {
    /// Client id the token was issued for
    #[serde(default)]
    pub audience: String,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub verified_email: bool,

    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: String,

    /// Remaining lifetime in seconds
    #[serde(default)]
    pub expires_in: i64,
}

/// Caller profile returned by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub email: String,

    /// Hosted (organizational) domain claim
    #[serde(default)]
    pub hd: Option<String>,
}

/// Remote identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Introspect an access token.
    async fn introspect(&self, token: &str) -> Result<TokenInfo, ProviderError>;

    /// Fetch the profile of the token's owner.
    async fn profile(&self, token: &str) -> Result<UserProfile, ProviderError>;
}

/// [`IdentityProvider`] backed by OAuth2 `tokeninfo` and `userinfo` endpoints.
#[derive(Debug, Clone)]
pub struct OAuthIdentityProvider {
    http: reqwest::Client,
    tokeninfo_url: Url,
    userinfo_url: Url,
}

impl OAuthIdentityProvider {
    /// Create a provider for the given endpoints.
    pub fn new(
        tokeninfo_url: &str,
        userinfo_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let parse = |url: &str| {
            Url::parse(url).map_err(|e| ProviderError::Config(format!("'{}': {}", url, e)))
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self {
            http,
            tokeninfo_url: parse(tokeninfo_url)?,
            userinfo_url: parse(userinfo_url)?,
        })
    }

    /// Create a provider for Google's OAuth2 v2 endpoints.
    pub fn google(timeout: Duration) -> Result<Self, ProviderError> {
        Self::new(GOOGLE_TOKENINFO_URL, GOOGLE_USERINFO_URL, timeout)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for OAuthIdentityProvider {
    async fn introspect(&self, token: &str) -> Result<TokenInfo, ProviderError> {
        let mut url = self.tokeninfo_url.clone();
        url.query_pairs_mut().append_pair("access_token", token);
        self.get_json(self.http.get(url)).await
    }

    async fn profile(&self, token: &str) -> Result<UserProfile, ProviderError> {
        self.get_json(self.http.get(self.userinfo_url.clone()).bearer_auth(token))
            .await
    }
}

// =============================================================================
// Identity Context
// =============================================================================

/// Verified claims about the caller, attached to each authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    pub user_id: String,
    pub email: String,
    pub verified_email: bool,
    pub scopes: Vec<String>,
    pub hosted_domain: Option<String>,
}

impl IdentityContext {
    fn from_claims(token: TokenInfo, profile: UserProfile) -> Self {
        Self {
            user_id: token.user_id,
            email: token.email,
            verified_email: token.verified_email,
            scopes: token.scope.split_whitespace().map(str::to_string).collect(),
            hosted_domain: profile.hd.filter(|hd| !hd.is_empty()),
        }
    }
}

/// Extractor for the [`IdentityContext`] set by [`auth_middleware`].
///
/// Rejects with 401 when the route is not behind the middleware.
#[derive(Debug, Clone)]
pub struct Identity(pub IdentityContext);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .map(Identity)
            .ok_or(AuthError::MissingAuth)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Authentication error types.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No Authorization header
    MissingAuth,

    /// Authorization header is not `Bearer <token>`
    MalformedAuth,

    /// Introspection failed or the provider rejected the token
    InvalidToken(String),

    /// Token was issued for another application
    AudienceMismatch { expected: String, actual: String },

    /// Token has no remaining lifetime
    TokenExpired,

    /// Profile could not be retrieved; this is provider trouble, not bad input
    ProfileFetchFailed(String),

    /// Caller's hosted domain is not the allowed one
    DomainNotAllowed {
        required: String,
        actual: Option<String>,
    },
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuth => write!(f, "Authorization header required"),
            AuthError::MalformedAuth => {
                write!(f, "Authorization header format must be 'Bearer {{token}}'")
            }
            AuthError::InvalidToken(_) => write!(f, "Invalid token or token validation failed"),
            AuthError::AudienceMismatch { .. } => write!(
                f,
                "Invalid token audience. Token not intended for this application."
            ),
            AuthError::TokenExpired => write!(f, "Token expired"),
            AuthError::ProfileFetchFailed(_) => {
                write!(f, "Failed to retrieve user details for domain validation.")
            }
            AuthError::DomainNotAllowed { required, actual } => {
                let actual = match actual.as_deref() {
                    Some(domain) if !domain.is_empty() => domain,
                    _ => "(not provided)",
                };
                write!(
                    f,
                    "Access restricted. User's domain '{}' is not allowed. Required domain: '{}'",
                    actual, required
                )
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingAuth
            | AuthError::MalformedAuth
            | AuthError::InvalidToken(_)
            | AuthError::AudienceMismatch { .. }
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::ProfileFetchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::DomainNotAllowed { .. } => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        // Provider-side detail stays in the log, never in the response body
        match &self {
            AuthError::ProfileFetchFailed(cause) => {
                error!(status = status.as_u16(), cause = %cause, "Authentication failed: {}", message);
            }
            AuthError::InvalidToken(cause) => {
                warn!(status = status.as_u16(), cause = %cause, "Authentication failed: {}", message);
            }
            AuthError::AudienceMismatch { expected, actual } => {
                warn!(
                    status = status.as_u16(),
                    expected = %expected,
                    actual = %actual,
                    "Authentication failed: {}",
                    message
                );
            }
            AuthError::DomainNotAllowed { .. } => {
                warn!(status = status.as_u16(), "Authorization failed: {}", message);
            }
            _ => {
                debug!(status = status.as_u16(), "Authentication failed: {}", message);
            }
        }

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Shared state for [`auth_middleware`].
#[derive(Clone)]
pub struct AuthState {
    provider: Arc<dyn IdentityProvider>,
    client_id: String,
    allowed_domain: Option<String>,
}

impl AuthState {
    /// Create a verifier.
    ///
    /// An empty `allowed_domain` is treated as no restriction.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        client_id: impl Into<String>,
        allowed_domain: Option<String>,
    ) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            allowed_domain: allowed_domain.filter(|d| !d.is_empty()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn allowed_domain(&self) -> Option<&str> {
        self.allowed_domain.as_deref()
    }

    /// Verify an Authorization header value and build the caller's identity.
    pub async fn verify(&self, authorization: Option<&str>) -> Result<IdentityContext, AuthError> {
        let token = bearer_token(authorization)?;

        let token_info = self
            .provider
            .introspect(token)
            .await
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if token_info.audience != self.client_id {
            return Err(AuthError::AudienceMismatch {
                expected: self.client_id.clone(),
                actual: token_info.audience,
            });
        }

        if token_info.expires_in <= 0 {
            debug!(email = %token_info.email, "Expired token received");
            return Err(AuthError::TokenExpired);
        }

        let profile = self
            .provider
            .profile(token)
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(e.to_string()))?;

        if let Some(required) = &self.allowed_domain {
            if profile.hd.as_deref() != Some(required.as_str()) {
                return Err(AuthError::DomainNotAllowed {
                    required: required.clone(),
                    actual: profile.hd,
                });
            }
        }

        Ok(IdentityContext::from_claims(token_info, profile))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The value must split on single spaces into exactly two parts, the first
/// being `bearer` in any case and the second non-empty.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let header = match authorization {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthError::MissingAuth),
    };

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(AuthError::MalformedAuth),
    }
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Axum middleware that verifies the bearer token and attaches an
/// [`IdentityContext`] to the request.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let authorization = match request.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::MalformedAuth)?),
        None => None,
    };

    let identity = auth.verify(authorization).await?;
    debug!(user_id = %identity.user_id, email = %identity.email, "Request authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
