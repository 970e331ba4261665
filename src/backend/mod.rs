//! Client for the image-generation backend.
//!
//! This module wraps the backend's native HTTP and WebSocket API:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     BackendClient                        │
//! │                                                          │
//! │  POST /prompt        GET /history/{id}    GET /view      │
//! │  POST /upload/image  WS   /ws?clientId=                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Workflow graphs and history results are kept as opaque JSON values; their
//! schema belongs to the backend.

mod client;
mod events;
mod types;
mod workflow;

pub use client::{generate_session_id, BackendClient, DEFAULT_BACKEND_TIMEOUT};
pub use events::EventStream;
pub use types::{content_type_for, PromptReceipt, PromptRequest, UploadReceipt, Workflow};
pub use workflow::load_workflow;
