use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Errors raised while talking to the image-generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Base URL could not be parsed or uses an unsupported scheme
    #[error("invalid backend base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The underlying HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// A prompt was submitted without a session identifier
    #[error("session id cannot be empty")]
    EmptySessionId,

    /// Transport failure (connection refused, timeout, reset)
    #[error("failed to reach backend at {url}: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Backend answered with a non-success status
    #[error("backend rejected request, status: {status}, url: {url}, body: {body}")]
    Rejected {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode backend response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Local file could not be read
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workflow file is not a JSON object
    #[error("invalid workflow JSON in '{}': {message}", path.display())]
    InvalidWorkflow { path: PathBuf, message: String },

    /// WebSocket handshake with the notification channel failed
    #[error("failed to open event stream at {url}: {message}")]
    EventStream { url: String, message: String },
}

impl BackendError {
    /// HTTP status reported by the backend, if the request got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend signalled a missing resource.
    ///
    /// A 404 status always counts. Any other error counts when its rendered
    /// message contains `not found`, which keeps callers that match on the
    /// message text working.
    pub fn is_not_found(&self) -> bool {
        if self.status() == Some(StatusCode::NOT_FOUND) {
            return true;
        }
        self.to_string().contains("not found")
    }
}

/// Errors raised by an identity provider while verifying a caller.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider configuration is unusable
    #[error("invalid identity provider configuration: {0}")]
    Config(String),

    /// The provider could not be reached
    #[error("identity provider unreachable: {0}")]
    Transport(String),

    /// The provider refused the request
    #[error("identity provider returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The provider answered with something we could not parse
    #[error("failed to decode identity provider response: {0}")]
    Decode(String),
}
