//! Configuration management for the gateway.
//!
//! Configuration comes from command-line arguments via clap, with every
//! option also readable from the environment (a `.env` file is loaded by the
//! binary before parsing).
//!
//! # Example
//!
//! ```ignore
//! use comfy_gateway::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Serve(config) = cli.into_command() {
//!     println!("Listening on {}", config.bind_address());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `HOST` - Server bind address (default: 0.0.0.0)
//! - `SERVER_PORT` - Server port (default: 8080)
//! - `COMFYUI_BASE_URL` - Backend base URL (default: http://127.0.0.1:8188)
//! - `GOOGLE_CLIENT_ID` - OAuth client id tokens must be issued for (required)
//! - `ALLOWED_AUTH_DOMAIN` - Hosted domain callers must belong to (optional)
//! - `RUN_MODE` - `debug` or `release` (default: release)
//! - `BACKEND_TIMEOUT_SECS` - Backend request timeout (default: 60)
//! - `TOKENINFO_URL` / `USERINFO_URL` - Identity provider endpoints
//! - `CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `API_BASE_PATH` - Prefix for the API routes (default: /api/v1)
//! - `MAX_UPLOAD_BYTES` - Upload body limit (default: 50 MiB)
//! - `UPLOAD_TMP_DIR` - Directory for upload scratch files

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::server::{
    DEFAULT_BASE_PATH, DEFAULT_MAX_UPLOAD_BYTES, GOOGLE_TOKENINFO_URL, GOOGLE_USERINFO_URL,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8188";

/// Default backend request timeout in seconds.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 60;

/// Timeout for identity provider calls in seconds.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLI Arguments
// =============================================================================

/// ComfyUI Gateway - an authenticated REST façade for a ComfyUI backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "comfy-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP gateway.
    Serve(ServeConfig),

    /// Submit a workflow file directly to the backend and print the receipt.
    Submit(SubmitConfig),
}

/// Server run mode.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Verbose logging
    Debug,
    #[default]
    Release,
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Parser, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SERVER_PORT")]
    pub port: u16,

    /// Prefix for the API routes.
    #[arg(long, default_value = DEFAULT_BASE_PATH, env = "API_BASE_PATH")]
    pub base_path: String,

    /// Run mode. `debug` turns on debug logging.
    #[arg(long, value_enum, default_value_t = RunMode::Release, env = "RUN_MODE")]
    pub mode: RunMode,

    // =========================================================================
    // Backend Configuration
    // =========================================================================
    /// Base URL of the ComfyUI backend.
    #[arg(long, default_value = DEFAULT_BACKEND_URL, env = "COMFYUI_BASE_URL")]
    pub backend_url: String,

    /// Timeout in seconds for each backend request.
    #[arg(long, default_value_t = DEFAULT_BACKEND_TIMEOUT_SECS, env = "BACKEND_TIMEOUT_SECS")]
    pub backend_timeout: u64,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// OAuth client id that access tokens must be issued for.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Hosted domain callers must belong to. Empty means any domain.
    #[arg(long, env = "ALLOWED_AUTH_DOMAIN")]
    pub allowed_domain: Option<String>,

    /// Token introspection endpoint.
    #[arg(long, default_value = GOOGLE_TOKENINFO_URL, env = "TOKENINFO_URL")]
    pub tokeninfo_url: String,

    /// User profile endpoint.
    #[arg(long, default_value = GOOGLE_USERINFO_URL, env = "USERINFO_URL")]
    pub userinfo_url: String,

    // =========================================================================
    // Upload Configuration
    // =========================================================================
    /// Maximum upload request size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    /// Directory for temporary upload files (defaults to the system temp dir).
    #[arg(long, env = "UPLOAD_TMP_DIR")]
    pub upload_dir: Option<PathBuf>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.backend_url.trim().is_empty() {
            return Err(
                "Backend URL is required. Set --backend-url or COMFYUI_BASE_URL".to_string(),
            );
        }

        if self.client_id().is_empty() {
            return Err(
                "OAuth client id is required. Set --client-id or GOOGLE_CLIENT_ID".to_string(),
            );
        }

        if self.backend_timeout == 0 {
            return Err("backend_timeout must be greater than 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured client id, or empty when unset (call validate() first).
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().map(str::trim).unwrap_or("")
    }

    /// The hosted-domain restriction, if any. Blank values mean none.
    pub fn allowed_domain(&self) -> Option<String> {
        self.allowed_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout)
    }

    /// Whether debug-level logging is wanted.
    pub fn debug_logging(&self) -> bool {
        self.verbose || self.mode == RunMode::Debug
    }
}

// =============================================================================
// Submit
// =============================================================================

#[derive(Parser, Debug, Clone)]
pub struct SubmitConfig {
    /// Path to a workflow JSON file.
    pub workflow: PathBuf,

    /// Base URL of the ComfyUI backend.
    #[arg(long, default_value = DEFAULT_BACKEND_URL, env = "COMFYUI_BASE_URL")]
    pub backend_url: String,

    /// Timeout in seconds for the backend request.
    #[arg(long, default_value_t = DEFAULT_BACKEND_TIMEOUT_SECS, env = "BACKEND_TIMEOUT_SECS")]
    pub backend_timeout: u64,

    /// Session id to submit under. A fresh one is generated when omitted.
    #[arg(long)]
    pub session_id: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SubmitConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout)
    }
}

// =============================================================================
// Tests
// =============================================================================
