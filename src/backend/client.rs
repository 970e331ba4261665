//! HTTP client for the backend's native API.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::{form_urlencoded, Url};
use uuid::Uuid;

use super::events::EventStream;
use super::types::{PromptReceipt, PromptRequest, UploadReceipt, Workflow};
use crate::error::BackendError;

/// Default overall deadline for a single backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Generate a fresh session identifier.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Client for one backend instance.
///
/// The session identifier is fixed at construction and only read afterwards,
/// so a single client can be shared across request handlers.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    ws_base_url: String,
    session_id: String,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create a client with a generated session identifier.
    ///
    /// `base_url` must be an absolute `http` or `https` URL, e.g.
    /// `http://127.0.0.1:8188`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        Self::with_session_id(base_url, String::new(), timeout)
    }

    /// Create a client with a caller-chosen session identifier.
    ///
    /// An empty `session_id` falls back to a generated one.
    pub fn with_session_id(
        base_url: &str,
        session_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let ws_base_url = websocket_base(base_url)?;

        let mut session_id = session_id.into();
        if session_id.is_empty() {
            session_id = generate_session_id();
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::ClientBuild(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ws_base_url,
            session_id,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn ws_base_url(&self) -> &str {
        &self.ws_base_url
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue a workflow under this client's session identifier.
    pub async fn submit_work(&self, graph: &Workflow) -> Result<PromptReceipt, BackendError> {
        self.submit_work_with_session(graph, &self.session_id).await
    }

    /// Queue a workflow under an explicit session identifier.
    ///
    /// Fails with [`BackendError::EmptySessionId`] before any network call if
    /// `session_id` is empty.
    pub async fn submit_work_with_session(
        &self,
        graph: &Workflow,
        session_id: &str,
    ) -> Result<PromptReceipt, BackendError> {
        if session_id.is_empty() {
            return Err(BackendError::EmptySessionId);
        }

        let url = format!("{}/prompt", self.base_url);
        let payload = PromptRequest {
            prompt: graph,
            client_id: session_id,
        };

        debug!(url = %url, session_id = session_id, nodes = graph.len(), "Queueing prompt");

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| unavailable(&url, source))?;

        let response = ensure_success(response, &url).await?;
        decode_json(response, &url).await
    }

    /// Fetch the execution history of a prompt.
    ///
    /// The result is the backend's JSON object, keyed by prompt id. An unknown
    /// id usually yields an empty object rather than an error.
    pub async fn fetch_history(&self, prompt_id: &str) -> Result<Map<String, Value>, BackendError> {
        let url = format!(
            "{}/history/{}",
            self.base_url,
            urlencoding::encode(prompt_id)
        );

        debug!(url = %url, "Fetching history");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| unavailable(&url, source))?;

        let response = ensure_success(response, &url).await?;
        decode_json(response, &url).await
    }

    /// Download an image.
    ///
    /// `kind` is the backend storage folder (`output`, `input` or `temp`).
    pub async fn fetch_image(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Bytes, BackendError> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("filename", filename)
            .append_pair("subfolder", subfolder)
            .append_pair("type", kind)
            .finish();
        let url = format!("{}/view?{}", self.base_url, query);

        debug!(url = %url, "Fetching image");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| unavailable(&url, source))?;

        let response = ensure_success(response, &url).await?;
        response
            .bytes()
            .await
            .map_err(|source| unavailable(&url, source))
    }

    /// Upload the file at `path`, stored by the backend as `filename`.
    pub async fn upload_image(
        &self,
        path: &Path,
        filename: &str,
        kind: &str,
        overwrite: bool,
    ) -> Result<UploadReceipt, BackendError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| BackendError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        self.upload_image_bytes(data, filename, kind, overwrite)
            .await
    }

    /// Upload in-memory image bytes as a multipart form.
    ///
    /// `overwrite` is sent as the literal string `"true"` or `"false"`.
    pub async fn upload_image_bytes(
        &self,
        data: impl Into<Vec<u8>>,
        filename: &str,
        kind: &str,
        overwrite: bool,
    ) -> Result<UploadReceipt, BackendError> {
        let url = format!("{}/upload/image", self.base_url);
        let data = data.into();

        debug!(url = %url, filename = filename, bytes = data.len(), "Uploading image");

        let form = Form::new()
            .part("image", Part::bytes(data).file_name(filename.to_string()))
            .text("type", kind.to_string())
            .text("overwrite", overwrite.to_string());

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| unavailable(&url, source))?;

        let response = ensure_success(response, &url).await?;
        decode_json(response, &url).await
    }

    /// Open the backend's progress notification channel for this session.
    pub async fn open_event_stream(&self) -> Result<EventStream, BackendError> {
        EventStream::connect(&self.ws_base_url, &self.session_id).await
    }

    /// Open the notification channel under a freshly generated session id.
    ///
    /// The id is available from [`EventStream::session_id`]; submit prompts
    /// with [`submit_work_with_session`](Self::submit_work_with_session) to
    /// receive their events on this stream.
    pub async fn open_event_stream_with_new_session(&self) -> Result<EventStream, BackendError> {
        EventStream::connect(&self.ws_base_url, &generate_session_id()).await
    }
}

/// Derive `ws://host[:port]` or `wss://host[:port]` from an HTTP base URL.
fn websocket_base(base_url: &str) -> Result<String, BackendError> {
    let invalid = |reason: String| BackendError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };

    let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;

    let scheme = match parsed.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    })
}

fn unavailable(url: &str, source: reqwest::Error) -> BackendError {
    BackendError::Unavailable {
        url: url.to_string(),
        source,
    }
}

async fn ensure_success(response: Response, url: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected {
        status,
        url: url.to_string(),
        body,
    })
}

async fn decode_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, BackendError> {
    let body = response
        .bytes()
        .await
        .map_err(|source| unavailable(url, source))?;

    serde_json::from_slice(&body).map_err(|e| BackendError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
