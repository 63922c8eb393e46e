//! # Chat Module
//!
//! Slack integration: outbound messages through the Web API, inbound request
//! verification and payload types, and the mention/button command handlers.

pub mod command;
pub mod inbound;
pub mod verification;

use crate::{credentials::Credentials, router::InteractiveControl, DependencyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

const SERVICE: &str = "slack";

/// Fallback text shown in notifications where blocks cannot be rendered.
pub const DEFAULT_FALLBACK_TEXT: &str = "PagerDuty status update";

/// A message ready to be posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// mrkdwn body
    pub text: String,
    /// Optional button rendered next to the body
    pub control: Option<InteractiveControl>,
    /// Plain-text fallback for notifications
    pub fallback_text: String,
}

impl ChatMessage {
    /// Plain text message without blocks.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            fallback_text: text.clone(),
            text,
            control: None,
        }
    }

    /// Single mrkdwn section block.
    pub fn section(text: impl Into<String>, fallback_text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            control: None,
            fallback_text: fallback_text.into(),
        }
    }

    pub fn with_control(mut self, control: InteractiveControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Slack Block Kit body for `chat.postMessage`.
    pub fn to_blocks(&self) -> serde_json::Value {
        let mut section = json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": self.text },
        });
        if let Some(control) = &self.control {
            section["accessory"] = json!({
                "type": "button",
                "text": { "type": "plain_text", "text": control.label },
                "action_id": control.action_id,
                "value": control.incident_id.as_str(),
            });
        }
        json!([section])
    }
}

/// Outbound chat operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Resolve a channel name (or ID) to its channel ID.
    async fn find_channel_id(&self, channel: &str) -> Result<String, DependencyError>;

    /// Post `message` to `channel_id`.
    async fn post_message(
        &self,
        channel_id: &str,
        message: &ChatMessage,
    ) -> Result<(), DependencyError>;
}

// ============================================================================
// Slack Web API client
// ============================================================================

/// Slack endpoint and request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Web API base URL
    pub api_url: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Oldest accepted inbound request timestamp, in seconds
    pub max_request_age_seconds: i64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: "https://slack.com/api".to_string(),
            timeout_seconds: 10,
            max_request_age_seconds: 300,
        }
    }
}

impl SlackConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsListResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

/// [`ChatClient`] backed by the Slack Web API.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    config: SlackConfig,
    credentials: Arc<Credentials>,
}

impl SlackClient {
    pub fn new(config: SlackConfig, credentials: Arc<Credentials>) -> Result<Self, DependencyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), method)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.credentials.slack.bot_token.expose_secret())
    }
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("config", &self.config)
            .field("credentials", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    #[instrument(skip(self))]
    async fn find_channel_id(&self, channel: &str) -> Result<String, DependencyError> {
        let mut cursor = String::new();
        loop {
            let mut query = vec![
                ("types", "public_channel,private_channel"),
                ("exclude_archived", "true"),
                ("limit", "200"),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }

            let response = self
                .http
                .get(self.endpoint("conversations.list"))
                .header("Authorization", self.bearer())
                .query(&query)
                .send()
                .await
                .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
            let response = ensure_success(response).await?;
            let page: ConversationsListResponse = response
                .json()
                .await
                .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

            if !page.ok {
                return Err(api_error(page.error));
            }

            if let Some(found) = page
                .channels
                .into_iter()
                .find(|c| c.id == channel || c.name.as_deref() == Some(channel))
            {
                debug!(channel_id = %found.id, "Resolved channel");
                return Ok(found.id);
            }

            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                return Err(DependencyError::ChannelNotFound {
                    channel: channel.to_string(),
                });
            }
        }
    }

    #[instrument(skip(self, message), fields(has_control = message.control.is_some()))]
    async fn post_message(
        &self,
        channel_id: &str,
        message: &ChatMessage,
    ) -> Result<(), DependencyError> {
        let body = json!({
            "channel": channel_id,
            "text": message.fallback_text,
            "blocks": message.to_blocks(),
        });

        let response = self
            .http
            .post(self.endpoint("chat.postMessage"))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
        let response = ensure_success(response).await?;
        let result: ApiResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        if !result.ok {
            return Err(api_error(result.error));
        }

        debug!("Posted message to Slack");
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DependencyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(DependencyError::HttpStatus {
        service: SERVICE,
        status: status.as_u16(),
        message,
    })
}

fn api_error(error: Option<String>) -> DependencyError {
    DependencyError::Api {
        service: SERVICE,
        message: error.unwrap_or_else(|| "unknown_error".to_string()),
    }
}
