//! Request and response payloads exchanged with the backend.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A workflow graph: node ids mapped to node definitions.
///
/// Forwarded verbatim; never validated here.
pub type Workflow = Map<String, Value>;

/// Body of `POST /prompt`.
#[derive(Debug, Serialize)]
pub struct PromptRequest<'a> {
    /// The workflow graph to execute
    pub prompt: &'a Workflow,

    /// Session identifier used to route progress events
    pub client_id: &'a str,
}

/// Receipt returned by the backend after queueing a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptReceipt {
    /// Backend-assigned prompt identifier
    pub prompt_id: String,

    /// Position of the prompt in the backend queue
    pub number: i64,

    /// Per-node validation errors, if any
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub node_errors: Map<String, Value>,
}

/// Descriptor of a file stored by `POST /upload/image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Name the backend stored the file under
    pub name: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub subfolder: String,

    /// Storage kind, e.g. `input` or `temp`
    #[serde(
        rename = "type",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub kind: String,
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Infer an image content type from a filename extension.
///
/// The backend's own `Content-Type` header is not trusted.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
