//! HTTP request handlers for the gateway API.
//!
//! # Endpoints
//!
//! - `POST {base}/queue_prompt` - Queue a workflow
//! - `GET {base}/history/{prompt_id}` - Prompt execution history
//! - `GET {base}/image` - Download a generated image
//! - `POST {base}/upload_image` - Upload an input image
//! - `GET /health` - Health check endpoint

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::auth::Identity;
use crate::backend::{content_type_for, BackendClient, PromptReceipt, UploadReceipt, Workflow};
use crate::error::BackendError;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the backend client.
#[derive(Clone)]
pub struct AppState {
    /// Client for the image-generation backend
    pub backend: Arc<BackendClient>,

    /// Directory for temporary upload files (system temp dir when unset)
    pub upload_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend: Arc::new(backend),
            upload_dir: None,
        }
    }

    /// Stage uploads in `dir` instead of the system temp directory.
    pub fn with_upload_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.upload_dir = dir;
        self
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Body of `POST /queue_prompt`.
#[derive(Debug, Deserialize)]
pub struct QueuePromptRequest {
    /// Workflow graph, keyed by node id
    pub prompt: Workflow,
}

/// Query parameters for image downloads.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQueryParams {
    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default)]
    pub subfolder: Option<String>,

    /// Storage kind: `output`, `input` or `temp`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Optional diagnostic detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Failure of an API handler.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing request data (400)
    BadRequest {
        message: String,
        details: Option<String>,
    },

    /// Request body exceeded the configured limit (413)
    PayloadTooLarge {
        message: String,
        details: Option<String>,
    },

    /// The backend reported the resource as missing (404)
    NotFound {
        message: String,
        details: Option<String>,
    },

    /// Any other backend failure (500)
    Backend {
        message: String,
        source: BackendError,
    },

    /// Unexpected local failure, such as temporary file handling (500)
    Internal { message: String, details: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Backend { .. } | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert ApiError to HTTP response.
///
/// - 5xx errors are logged at ERROR level
/// - 404 is logged at DEBUG level
/// - other 4xx errors are logged at WARN level
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_type, body) = match self {
            ApiError::BadRequest { message, details } => (
                "bad_request",
                ErrorResponse {
                    error: message,
                    details,
                },
            ),
            ApiError::PayloadTooLarge { message, details } => (
                "payload_too_large",
                ErrorResponse {
                    error: message,
                    details,
                },
            ),
            ApiError::NotFound { message, details } => (
                "not_found",
                ErrorResponse {
                    error: message,
                    details,
                },
            ),
            ApiError::Backend { message, source } => (
                "backend_error",
                ErrorResponse::with_details(message, source.to_string()),
            ),
            ApiError::Internal { message, details } => (
                "internal_error",
                ErrorResponse::with_details(message, details),
            ),
        };

        let details = body.details.as_deref().unwrap_or("");
        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                details = details,
                "Server error: {}",
                body.error
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                details = details,
                "Resource not found: {}",
                body.error
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                details = details,
                "Client error: {}",
                body.error
            );
        }

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle prompt submission.
///
/// # Endpoint
///
/// `POST {base}/queue_prompt`
///
/// # Request Body
///
/// ```json
/// { "prompt": { "3": { "class_type": "KSampler", "inputs": { "seed": 123 } } } }
/// ```
///
/// # Response
///
/// - `200 OK`: `{ "prompt_id": "...", "number": 1, "node_errors": {...} }`
/// - `400 Bad Request`: Body is not JSON or lacks a `prompt` object
/// - `500 Internal Server Error`: Backend unreachable or rejected the prompt
pub async fn queue_prompt_handler(
    State(state): State<AppState>,
    Identity(identity): Identity,
    body: Result<Json<QueuePromptRequest>, JsonRejection>,
) -> Result<Json<PromptReceipt>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest {
        message: "Invalid request body".to_string(),
        details: Some(rejection.body_text()),
    })?;

    let receipt = state
        .backend
        .submit_work(&request.prompt)
        .await
        .map_err(|source| ApiError::Backend {
            message: "Failed to queue prompt".to_string(),
            source,
        })?;

    info!(
        user = %identity.email,
        prompt_id = %receipt.prompt_id,
        number = receipt.number,
        "Prompt queued"
    );

    Ok(Json(receipt))
}

/// Handle prompt history requests.
///
/// # Endpoint
///
/// `GET {base}/history/{prompt_id}`
///
/// # Response
///
/// - `200 OK`: Raw backend history object keyed by prompt id
/// - `400 Bad Request`: Empty prompt id
/// - `404 Not Found`: Backend has no history for the prompt
/// - `500 Internal Server Error`: Backend failure
pub async fn history_handler(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(prompt_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if prompt_id.is_empty() {
        return Err(ApiError::bad_request("prompt_id path parameter is required"));
    }

    debug!(user = %identity.email, prompt_id = %prompt_id, "History requested");

    let history = state
        .backend
        .fetch_history(&prompt_id)
        .await
        .map_err(|source| {
            if source.is_not_found() {
                debug!(prompt_id = %prompt_id, error = %source, "Backend reported missing history");
                ApiError::NotFound {
                    message: "Prompt history not found".to_string(),
                    details: Some(format!("prompt_id: {}", prompt_id)),
                }
            } else {
                ApiError::Backend {
                    message: "Failed to get prompt history".to_string(),
                    source,
                }
            }
        })?;

    if history.is_empty() {
        return Err(ApiError::NotFound {
            message: "Prompt history not found or empty".to_string(),
            details: Some(format!("prompt_id: {}", prompt_id)),
        });
    }

    Ok(Json(Value::Object(history)))
}

/// Handle image downloads.
///
/// # Endpoint
///
/// `GET {base}/image?filename=&subfolder=&type=`
///
/// # Response
///
/// - `200 OK`: Image bytes; `Content-Type` inferred from the filename extension
/// - `400 Bad Request`: Missing `filename` or `type`
/// - `404 Not Found`: Image not found on the backend
/// - `500 Internal Server Error`: Backend failure
pub async fn image_handler(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Query(query): Query<ImageQueryParams>,
) -> Result<Response, ApiError> {
    let (filename, kind) = match (query.filename.as_deref(), query.kind.as_deref()) {
        (Some(filename), Some(kind)) if !filename.is_empty() && !kind.is_empty() => {
            (filename, kind)
        }
        _ => {
            return Err(ApiError::bad_request(
                "Missing required query parameters: filename, type",
            ))
        }
    };
    let subfolder = query.subfolder.as_deref().unwrap_or("");

    debug!(user = %identity.email, filename = filename, kind = kind, "Image requested");

    let data = state
        .backend
        .fetch_image(filename, subfolder, kind)
        .await
        .map_err(|source| {
            if source.is_not_found() {
                ApiError::NotFound {
                    message: "Image not found".to_string(),
                    details: None,
                }
            } else {
                ApiError::Backend {
                    message: "Failed to get image".to_string(),
                    source,
                }
            }
        })?;

    Ok(([(header::CONTENT_TYPE, content_type_for(filename))], data).into_response())
}

/// Handle image uploads.
///
/// # Endpoint
///
/// `POST {base}/upload_image` (`multipart/form-data`)
///
/// # Form Fields
///
/// - `image`: The file to upload (required)
/// - `type`: Storage kind, usually `input` (required)
/// - `overwrite`: `true` to replace an existing file (optional, default false)
///
/// The file is staged in a temporary file that is removed once the request
/// finishes, whatever the outcome.
///
/// # Response
///
/// - `200 OK`: `{ "name": "...", "subfolder": "...", "type": "..." }`
/// - `400 Bad Request`: Missing `type` or `image`
/// - `413 Payload Too Large`: Body exceeds the upload limit
/// - `500 Internal Server Error`: Staging or backend failure
pub async fn upload_image_handler(
    State(state): State<AppState>,
    Identity(identity): Identity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReceipt>, ApiError> {
    let mut multipart = multipart
        .map_err(|rejection| invalid_multipart(rejection.status(), rejection.body_text()))?;

    let form = UploadForm::read(&mut multipart, state.upload_dir.as_deref()).await?;

    let kind = match form.kind {
        Some(kind) if !kind.is_empty() => kind,
        _ => return Err(ApiError::bad_request("Form field 'type' is required")),
    };
    let image = form
        .image
        .ok_or_else(|| ApiError::bad_request("Form field 'image' (file) is required"))?;

    let receipt = state
        .backend
        .upload_image(image.scratch.path(), &image.filename, &kind, form.overwrite)
        .await
        .map_err(|source| ApiError::Backend {
            message: "Failed to upload image".to_string(),
            source,
        })?;

    info!(
        user = %identity.email,
        name = %receipt.name,
        kind = %kind,
        bytes = image.size,
        "Image uploaded"
    );

    Ok(Json(receipt))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Upload Helpers
// =============================================================================

/// Map a multipart failure to 413 when the body limit was hit, else 400.
fn invalid_multipart(status: StatusCode, details: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            message: "Upload exceeds the maximum allowed size".to_string(),
            details: Some(details),
        }
    } else {
        ApiError::BadRequest {
            message: "Invalid multipart form".to_string(),
            details: Some(details),
        }
    }
}

fn scratch_failure(e: std::io::Error) -> ApiError {
    ApiError::Internal {
        message: "Failed to process uploaded file".to_string(),
        details: e.to_string(),
    }
}

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    kind: Option<String>,
    overwrite: bool,
    image: Option<StagedImage>,
}

/// An image part already written to its scratch file.
struct StagedImage {
    filename: String,
    scratch: UploadScratch,
    size: usize,
}

impl UploadForm {
    /// Read every field, streaming the `image` part to a scratch file in
    /// `upload_dir` as it arrives.
    async fn read(multipart: &mut Multipart, upload_dir: Option<&FsPath>) -> Result<Self, ApiError> {
        let invalid = |e: MultipartError| invalid_multipart(e.status(), e.body_text());

        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("type") => form.kind = Some(field.text().await.map_err(invalid)?),
                Some("overwrite") => form.overwrite = field.text().await.map_err(invalid)? == "true",
                Some("image") => {
                    // Only parts carrying a filename count as files
                    let filename = match field.file_name() {
                        Some(name) if !name.is_empty() => name.to_string(),
                        _ => continue,
                    };
                    let scratch = UploadScratch::create(upload_dir, &filename)?;
                    let size = scratch.write_field(field).await?;
                    form.image = Some(StagedImage {
                        filename,
                        scratch,
                        size,
                    });
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

/// Temporary file holding an upload while it is forwarded.
///
/// Removed on drop; a failed removal is logged and otherwise ignored.
struct UploadScratch {
    file: Option<NamedTempFile>,
}

impl UploadScratch {
    fn create(dir: Option<&FsPath>, filename: &str) -> Result<Self, ApiError> {
        let base_name = FsPath::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image");
        let suffix = format!("_{}", base_name);

        let mut builder = tempfile::Builder::new();
        builder.prefix("upload_").suffix(&suffix);

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(scratch_failure)?;

        Ok(Self { file: Some(file) })
    }

    fn path(&self) -> &FsPath {
        match &self.file {
            Some(file) => file.path(),
            None => FsPath::new(""),
        }
    }

    /// Copy a multipart field into the file chunk by chunk; returns the size.
    async fn write_field(&self, mut field: Field<'_>) -> Result<usize, ApiError> {
        let handle = match &self.file {
            Some(file) => file.as_file().try_clone().map_err(scratch_failure)?,
            None => return Err(scratch_failure(std::io::ErrorKind::NotFound.into())),
        };
        let mut out = tokio::fs::File::from_std(handle);

        let mut size = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| invalid_multipart(e.status(), e.body_text()))?
        {
            out.write_all(&chunk).await.map_err(scratch_failure)?;
            size += chunk.len();
        }
        out.flush().await.map_err(scratch_failure)?;

        Ok(size)
    }
}

impl Drop for UploadScratch {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove temporary upload file"
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
