//! Main proxy server implementation

use anyhow::Context;
use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handler::ProxyHandler;
use crate::config::{AppConfig, UpstreamConfig};
use crate::rewrite::RequestRewriter;

/// Shared state for the proxy
///
/// Read-only after startup; cloning is cheap.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub rewriter: Arc<RequestRewriter>,
    pub http_client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        let http_client = build_http_client(&config.upstream)?;
        let rewriter = RequestRewriter::from_config(&config);

        Ok(Self {
            config: Arc::new(config),
            rewriter: Arc::new(rewriter),
            http_client,
        })
    }
}

/// Build the single upstream HTTP client shared by all requests
fn build_http_client(upstream: &UpstreamConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut client_builder =
        reqwest::Client::builder().pool_max_idle_per_host(upstream.pool_max_idle_per_host);

    if let Some(seconds) = upstream.timeout_seconds {
        client_builder = client_builder.timeout(Duration::from_secs(seconds));
    }

    client_builder.build()
}

/// Build the router with all proxy routes
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat/completions", post(chat_completions_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the proxy server
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let listen_addr = config.server.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    let state = ProxyState::new(config).context("Failed to build upstream HTTP client")?;

    tracing::info!("prompt-proxy listening on {}", listener.local_addr()?);
    log_rewrite_config(&state.config);

    serve(listener, state).await
}

/// Serve on an already bound listener until Ctrl-C / SIGTERM
pub async fn serve(listener: TcpListener, state: ProxyState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("prompt-proxy shut down");
    Ok(())
}

fn log_rewrite_config(config: &AppConfig) {
    tracing::info!("Proxying to {}", config.upstream.endpoint);
    tracing::info!(
        default_model = config.upstream.default_model.as_deref().unwrap_or("<client>"),
        overwrite_system_prompt = config.prompts.overwrite_system_prompt.is_some(),
        append_system_prompt = config.prompts.append_system_prompt.is_some(),
        bearer_auth = config.upstream.api_key.is_some(),
        timeout_seconds = ?config.upstream.timeout_seconds,
        "Rewrite rules configured"
    );
    if config.prompts.overwrite_system_prompt.is_some() && config.prompts.append_system_prompt.is_some() {
        tracing::warn!("Both OVERWRITE_SYSTEM_PROMPT and APPEND_SYSTEM_PROMPT are set; APPEND_SYSTEM_PROMPT is ignored");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Chat completion endpoint
async fn chat_completions_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let handler = ProxyHandler::new(state);
    handler.handle(req).await
}
