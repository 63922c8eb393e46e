//! Configuration types for the HTTP service
//!
//! Every field carries a serde default so an empty configuration source
//! produces a runnable service. Secrets are never part of this document;
//! [`SecretsConfig`] only says where to fetch them from.

use crate::errors::ConfigError;
use pager_bridge_core::{
    chat::SlackConfig,
    credentials::{CommandSettings, DEFAULT_PING_PHRASE, DEFAULT_SLACK_COMMAND},
    incident::PagerDutyConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Slack commands and Web API settings
    pub slack: SlackSettings,

    /// PagerDuty endpoints
    pub pagerduty: PagerDutyConfig,

    /// Directory holding message template overrides
    pub templates_dir: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Where credentials are fetched from
    pub secrets: SecretsConfig,
}

impl BridgeConfig {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }
        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be non-zero".to_string(),
            });
        }
        if !self.slack.command.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("slack.command '{}' must start with '/'", self.slack.command),
            });
        }
        if self.slack.ping_phrase.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "slack.ping_phrase".to_string(),
            });
        }
        if self.slack.max_request_age_seconds <= 0 {
            return Err(ConfigError::Invalid {
                message: "slack.max_request_age_seconds must be positive".to_string(),
            });
        }
        if let SecretsConfig::AwsSecretsManager { secret_id } = &self.secrets {
            if secret_id.is_empty() {
                return Err(ConfigError::Missing {
                    key: "secrets.secret_id".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Slack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    /// Slash command accepted in addition to mentions
    pub command: String,

    /// Mention text answered with a pong
    pub ping_phrase: String,

    /// Web API base URL
    pub api_url: String,

    /// Outbound request timeout in seconds
    pub timeout_seconds: u64,

    /// Replay window for inbound request timestamps
    pub max_request_age_seconds: i64,
}

impl Default for SlackSettings {
    fn default() -> Self {
        let client = SlackConfig::default();
        Self {
            command: DEFAULT_SLACK_COMMAND.to_string(),
            ping_phrase: DEFAULT_PING_PHRASE.to_string(),
            api_url: client.api_url,
            timeout_seconds: client.timeout_seconds,
            max_request_age_seconds: client.max_request_age_seconds,
        }
    }
}

impl SlackSettings {
    pub fn client_config(&self) -> SlackConfig {
        SlackConfig {
            api_url: self.api_url.clone(),
            timeout_seconds: self.timeout_seconds,
            max_request_age_seconds: self.max_request_age_seconds,
        }
    }

    pub fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            command: self.command.clone(),
            ping_phrase: self.ping_phrase.clone(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable JSON structured logging
    pub json: bool,
}

/// Secret store selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SecretsConfig {
    /// Process environment
    #[default]
    Environment,

    /// JSON object of string values on disk
    File { path: PathBuf },

    /// AWS Secrets Manager secret holding a JSON object
    AwsSecretsManager { secret_id: String },
}

impl SecretsConfig {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::File { .. } => "file",
            Self::AwsSecretsManager { .. } => "aws_secrets_manager",
        }
    }
}
