//! ComfyUI Gateway - an authenticated REST façade for a ComfyUI backend.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfy_gateway::{
    backend::{load_workflow, BackendClient},
    config::{Cli, Command, ServeConfig, SubmitConfig, DEFAULT_AUTH_TIMEOUT_SECS},
    server::{create_router, AuthState, OAuthIdentityProvider, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Submit(config) => run_submit(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.debug_logging());

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    info!("  Backend: {}", config.backend_url);
    info!("  Backend timeout: {}s", config.backend_timeout);
    info!("  API base path: {}", config.base_path);
    info!("  OAuth client id: {}", config.client_id());
    match config.allowed_domain() {
        Some(domain) => info!("  Allowed domain: {}", domain),
        None => warn!("  Allowed domain: any (set ALLOWED_AUTH_DOMAIN to restrict)"),
    }

    let backend = match BackendClient::new(&config.backend_url, config.backend_timeout()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create backend client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("  Session id: {}", backend.session_id());

    let provider = match OAuthIdentityProvider::new(
        &config.tokeninfo_url,
        &config.userinfo_url,
        Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
    ) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to create identity provider: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let auth = AuthState::new(
        Arc::new(provider),
        config.client_id(),
        config.allowed_domain(),
    );

    let router = create_router(backend, auth, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl -H 'Authorization: Bearer <token>' http://{}{}/history/<prompt_id>",
        addr,
        config.base_path.trim_end_matches('/')
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!(" ██████╗ ██████╗ ███╗   ███╗███████╗██╗   ██╗");
    info!("██╔════╝██╔═══██╗████╗ ████║██╔════╝╚██╗ ██╔╝");
    info!("██║     ██║   ██║██╔████╔██║█████╗   ╚████╔╝ ");
    info!("██║     ██║   ██║██║╚██╔╝██║██╔══╝    ╚██╔╝  ");
    info!("╚██████╗╚██████╔╝██║ ╚═╝ ██║██║        ██║   ");
    info!(" ╚═════╝ ╚═════╝ ╚═╝     ╚═╝╚═╝        ╚═╝   ");
    info!("                 gateway v{}", version);
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "comfy_gateway=debug,tower_http=debug"
    } else {
        "comfy_gateway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::default()
        .with_base_path(config.base_path.clone())
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    if let Some(ref dir) = config.upload_dir {
        router_config = router_config.with_upload_dir(dir.clone());
    }

    router_config
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// =============================================================================
// Submit Command
// =============================================================================

async fn run_submit(config: SubmitConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let workflow = match load_workflow(&config.workflow) {
        Ok(workflow) => workflow,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = match config.session_id.clone() {
        Some(session_id) => {
            BackendClient::with_session_id(&config.backend_url, session_id, config.backend_timeout())
        }
        None => BackendClient::new(&config.backend_url, config.backend_timeout()),
    };
    let client = match client {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let receipt = match client.submit_work(&workflow).await {
        Ok(receipt) => receipt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let output = serde_json::json!({
        "session_id": client.session_id(),
        "prompt_id": receipt.prompt_id,
        "number": receipt.number,
        "node_errors": receipt.node_errors,
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
