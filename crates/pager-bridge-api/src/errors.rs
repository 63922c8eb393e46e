//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pager_bridge_core::{webhook::WebhookPlatform, BridgeError};
use tracing::warn;

/// A request the bridge refused.
///
/// Every failure maps to `403 Forbidden` with an empty JSON object. The
/// cause is only logged; callers learn nothing about why they were rejected
/// and apply their own redelivery policy.
#[derive(Debug, thiserror::Error)]
#[error("{platform:?} request rejected: {source}")]
pub struct WebhookHandlerError {
    pub platform: WebhookPlatform,
    #[source]
    pub source: BridgeError,
}

impl WebhookHandlerError {
    pub fn new(platform: WebhookPlatform, source: BridgeError) -> Self {
        Self { platform, source }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        warn!(
            platform = self.platform.as_str(),
            kind = self.source.kind(),
            error = %self.source,
            "Rejecting request"
        );

        (StatusCode::FORBIDDEN, Json(serde_json::json!({}))).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}
