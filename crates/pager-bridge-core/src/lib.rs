//! # Pager-Bridge Core
//!
//! Domain library for the PagerDuty/Slack notification bridge.
//!
//! This crate provides:
//! - PagerDuty webhook signature verification and envelope parsing
//! - Incident directory operations against the PagerDuty REST and Events APIs
//! - Routing of incident lifecycle events to Slack notifications
//! - Parsing and handling of Slack mentions, button clicks and slash commands
//! - Credential loading from a managed secret store
//!
//! The HTTP surface lives in `pager-bridge-api`; this crate never binds a socket.

pub mod chat;
pub mod credentials;
pub mod incident;
pub mod router;
pub mod templates;
pub mod webhook;

pub use credentials::{Credentials, SecretString};
pub use router::{InteractiveControl, NotificationRouter, OutboundNotification};
pub use templates::{TemplateError, TemplateKind, TemplateRenderer};

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

#[cfg(test)]
mod test_support;

// ============================================================================
// Identifiers
// ============================================================================

/// PagerDuty incident identifier (e.g. `Q1ABCDEF2GHIJ3`).
///
/// Opaque to this crate; it is only ever echoed back to PagerDuty or
/// carried inside a Slack button value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    /// Create a new incident identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for every bridge operation.
///
/// The HTTP boundary converts all variants into the same generic rejection;
/// the variant only drives server-side logging and metrics.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The request signature did not match any accepted signature.
    ///
    /// Deliberately carries no detail.
    #[error("Webhook authentication failed")]
    Authentication,

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Dependency failure: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Template rendering failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl BridgeError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::Dependency(_) => "dependency",
            Self::Template(_) => "template",
            Self::Configuration(_) => "configuration",
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }
}

/// Failure talking to PagerDuty or Slack.
///
/// Never retried internally; upstream webhook redelivery is the only retry.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("{service} returned HTTP {status}: {message}")]
    HttpStatus {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an unexpected response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    /// Slack Web API answered `ok: false`.
    #[error("{service} API error: {message}")]
    Api {
        service: &'static str,
        message: String,
    },

    #[error("Channel '{channel}' not found")]
    ChannelNotFound { channel: String },
}

impl DependencyError {
    /// Classify a reqwest failure as transport or decode error.
    pub fn from_reqwest(service: &'static str, error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse {
                service,
                message: error.to_string(),
            }
        } else {
            Self::Transport {
                service,
                message: error.to_string(),
            }
        }
    }

    /// HTTP status of the failed call, if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Missing or unusable process configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing secret: {key}")]
    MissingSecret { key: String },

    #[error("Secret store failure: {message}")]
    SecretStore { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
