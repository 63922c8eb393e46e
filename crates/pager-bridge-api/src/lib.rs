//! # Pager-Bridge HTTP Service
//!
//! HTTP surface of the bridge. A single endpoint receives both PagerDuty
//! webhooks and Slack requests and tells them apart by their headers.
//!
//! This service provides:
//! - the shared webhook endpoint (`POST /` and `POST /webhook`)
//! - a health endpoint
//! - a Prometheus metrics endpoint

pub mod config;
pub mod errors;
pub mod metrics;

pub use config::{BridgeConfig, LoggingConfig, SecretsConfig, ServerConfig, SlackSettings};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use metrics::BridgeMetrics;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use pager_bridge_core::{
    chat::{
        command::CommandHandler,
        inbound::{self, SlackRequest},
        verification,
    },
    webhook::{self, IncidentWebhookHandler, WebhookPlatform},
    BridgeError, Credentials,
};
use serde::Serialize;
use std::{collections::HashMap, future::IntoFuture, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<BridgeConfig>,

    /// Signing secrets for inbound verification
    pub credentials: Arc<Credentials>,

    /// PagerDuty webhook pipeline
    pub incident_handler: Arc<IncidentWebhookHandler>,

    /// Slack mention, slash command and button handling
    pub command_handler: Arc<CommandHandler>,

    /// Metrics collector for observability
    pub metrics: Arc<BridgeMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: BridgeConfig,
        credentials: Arc<Credentials>,
        incident_handler: Arc<IncidentWebhookHandler>,
        command_handler: Arc<CommandHandler>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            incident_handler,
            command_handler,
            metrics,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/", post(handle_webhook))
        .route("/webhook", post(handle_webhook));

    let observability_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint));

    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .merge(webhook_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until SIGINT/SIGTERM.
///
/// After the signal, in-flight requests get `shutdown_timeout_seconds` to
/// finish before the server stops waiting for them.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    state.config.validate()?;
    let server_config = state.config.server.clone();
    let app = create_router(state);

    let address = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    let shutdown_timeout = Duration::from_secs(server_config.shutdown_timeout_seconds);
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!(
            "Initiating graceful shutdown with {}s timeout",
            shutdown_timeout.as_secs()
        );
        let _ = shutdown_tx.send(true);
    });

    let drain_deadline = async move {
        if shutdown_rx.wait_for(|started| *started).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = drain_deadline => {
            warn!("Graceful shutdown timed out; abandoning in-flight requests");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
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
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle a request on the shared webhook endpoint.
///
/// PagerDuty deliveries are processed before the response is produced, so a
/// failure reaches PagerDuty as a non-success status and triggers its
/// redelivery. Slack requests are verified and decoded inline, then
/// acknowledged at once; the command itself runs on a spawned task.
#[instrument(skip_all, fields(body_len = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookHandlerError> {
    let header_map = webhook::normalize_headers(
        headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_str().unwrap_or(""))),
    );

    let platform = WebhookPlatform::from_headers(&header_map);
    state.metrics.record_received(platform);

    let result = match platform {
        WebhookPlatform::PagerDuty => handle_pagerduty(&state, &header_map, &body).await,
        WebhookPlatform::Slack => handle_slack(&state, &header_map, &body),
    };

    result.map_err(|e| {
        state.metrics.record_rejection(e.kind());
        WebhookHandlerError::new(platform, e)
    })
}

async fn handle_pagerduty(
    state: &AppState,
    headers: &HashMap<String, String>,
    body: &[u8],
) -> Result<Response, BridgeError> {
    let outcome = state.incident_handler.handle(headers, body).await?;
    state.metrics.record_dispatch(&outcome);

    Ok(Json(serde_json::json!({})).into_response())
}

fn handle_slack(
    state: &AppState,
    headers: &HashMap<String, String>,
    body: &Bytes,
) -> Result<Response, BridgeError> {
    verification::verify_slack_request(
        headers.get(verification::SIGNATURE_HEADER).map(String::as_str),
        headers.get(verification::TIMESTAMP_HEADER).map(String::as_str),
        body,
        state.credentials.slack.signing_secret.expose_secret(),
        state.config.slack.max_request_age_seconds,
        chrono::Utc::now(),
    )?;

    let request = inbound::parse_request(body)?;
    if let SlackRequest::UrlVerification { challenge } = request {
        info!("Answering Slack URL verification");
        return Ok(Json(serde_json::json!({ "challenge": challenge })).into_response());
    }
    if request == SlackRequest::Ignored {
        return Ok(StatusCode::OK.into_response());
    }

    let handler = state.command_handler.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        let result = match &request {
            SlackRequest::Mention(mention) => handler.handle_mention(mention).await.map(Some),
            SlackRequest::Interaction(payload) => handler.handle_action(payload).await,
            SlackRequest::SlashCommand(command) => handler.handle_slash_command(command).await,
            SlackRequest::UrlVerification { .. } | SlackRequest::Ignored => Ok(None),
        };

        match result {
            Ok(Some(intent)) => metrics.record_command(intent.kind()),
            Ok(None) => {}
            Err(e) => {
                metrics.record_command_failure();
                error!(kind = e.kind(), error = %e, "Slack command failed");
            }
        }
    });

    Ok(StatusCode::OK.into_response())
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Basic health check endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .render()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Response Types
// ============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
