//! # Incident Directory
//!
//! Operations against PagerDuty: resolving which Slack channel an incident
//! belongs to, triggering incidents from Slack, and reading incident status.
//!
//! There is no local state. The originating channel travels as the
//! `custom_details` of the triggering event and is read back from the
//! incident's first trigger log entry.

use crate::{credentials::Credentials, DependencyError, IncidentId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument};
use url::Url;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

const SERVICE: &str = "pagerduty";

/// Maximum summary length accepted by the Events API.
pub const MAX_SUMMARY_LENGTH: usize = 1024;

/// Current state of an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentStatus {
    pub incident_id: IncidentId,
    pub status: String,
}

/// Interface to the incident platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IncidentDirectory: Send + Sync {
    /// Find the Slack channel that triggered `incident_id`.
    ///
    /// `Ok(None)` means the incident was not created through the bridge.
    async fn resolve_channel(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Option<String>, DependencyError>;

    /// Open a critical incident on behalf of `channel`.
    async fn trigger_incident(&self, summary: &str, channel: &str) -> Result<(), DependencyError>;

    /// Fetch the live status of an incident.
    async fn get_incident(&self, incident_id: &IncidentId)
        -> Result<IncidentStatus, DependencyError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Endpoints and transport settings for [`PagerDutyClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerDutyConfig {
    /// REST API base URL
    pub rest_api_url: String,
    /// Events API v2 enqueue URL
    pub events_api_url: String,
    /// Channel receiving webhook ping acknowledgements
    pub diagnostic_channel: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            rest_api_url: "https://api.pagerduty.com".to_string(),
            events_api_url: "https://events.pagerduty.com/v2/enqueue".to_string(),
            diagnostic_channel: "temp-pagerduty-testing".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl PagerDutyConfig {
    /// Point both APIs at `base_url` (used with mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.events_api_url = format!("{}/v2/enqueue", base_url);
        self.rest_api_url = base_url;
        self
    }

    pub fn with_diagnostic_channel(mut self, channel: impl Into<String>) -> Self {
        self.diagnostic_channel = channel.into();
        self
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct TriggerEvent<'a> {
    payload: TriggerPayload<'a>,
    routing_key: &'a str,
    event_action: &'static str,
}

#[derive(Debug, Serialize)]
struct TriggerPayload<'a> {
    summary: &'a str,
    severity: &'static str,
    source: &'static str,
    custom_details: &'a str,
}

#[derive(Debug, Deserialize)]
struct IncidentResponse {
    incident: IncidentBody,
}

#[derive(Debug, Deserialize)]
struct IncidentBody {
    id: IncidentId,
    status: String,
    #[serde(default)]
    first_trigger_log_entry: Option<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    channel: Option<LogEntryChannel>,
}

#[derive(Debug, Deserialize)]
struct LogEntryChannel {
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl IncidentBody {
    fn originating_channel(self) -> Option<String> {
        match self.first_trigger_log_entry?.channel?.details? {
            serde_json::Value::String(channel) if !channel.is_empty() => Some(channel),
            _ => None,
        }
    }
}

// ============================================================================
// PagerDuty client
// ============================================================================

/// [`IncidentDirectory`] backed by the PagerDuty REST and Events APIs.
#[derive(Clone)]
pub struct PagerDutyClient {
    http: reqwest::Client,
    config: PagerDutyConfig,
    credentials: Arc<Credentials>,
}

impl PagerDutyClient {
    pub fn new(config: PagerDutyConfig, credentials: Arc<Credentials>) -> Result<Self, DependencyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("pager-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    /// `{rest_api_url}/incidents/{id}` with the ID escaped as one path segment.
    fn incident_url(&self, incident_id: &IncidentId) -> Result<Url, DependencyError> {
        let invalid = |message: String| DependencyError::Transport {
            service: SERVICE,
            message,
        };

        let mut url = Url::parse(&self.config.rest_api_url)
            .map_err(|e| invalid(format!("invalid REST API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid("REST API URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("incidents")
            .push(incident_id.as_str());
        Ok(url)
    }

    async fn fetch_incident(
        &self,
        incident_id: &IncidentId,
        include_first_trigger: bool,
    ) -> Result<IncidentBody, DependencyError> {
        let url = self.incident_url(incident_id)?;

        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.pagerduty+json;version=2")
            .header("Content-Type", "application/json")
            .header(
                "Authorization",
                format!(
                    "Token token={}",
                    self.credentials.pagerduty.rest_api_key.expose_secret()
                ),
            );
        if include_first_trigger {
            request = request.query(&[("include[]", "first_trigger_log_entries")]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
        let response = ensure_success(response).await?;

        let body: IncidentResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
        Ok(body.incident)
    }
}

impl std::fmt::Debug for PagerDutyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagerDutyClient")
            .field("config", &self.config)
            .field("credentials", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl IncidentDirectory for PagerDutyClient {
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    async fn resolve_channel(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Option<String>, DependencyError> {
        let incident = self.fetch_incident(incident_id, true).await?;
        let channel = incident.originating_channel();
        debug!(found = channel.is_some(), "Resolved originating channel");
        Ok(channel)
    }

    #[instrument(skip(self, summary), fields(summary_len = summary.len()))]
    async fn trigger_incident(&self, summary: &str, channel: &str) -> Result<(), DependencyError> {
        let event = TriggerEvent {
            payload: TriggerPayload {
                summary: truncate(summary, MAX_SUMMARY_LENGTH),
                severity: "critical",
                source: "slack",
                custom_details: channel,
            },
            routing_key: self.credentials.pagerduty.events_api_key.expose_secret(),
            event_action: "trigger",
        };

        let response = self
            .http
            .post(&self.config.events_api_url)
            .json(&event)
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
        let response = ensure_success(response).await?;

        info!(status = response.status().as_u16(), "Incident event sent to PagerDuty");
        Ok(())
    }

    #[instrument(skip(self), fields(incident_id = %incident_id))]
    async fn get_incident(
        &self,
        incident_id: &IncidentId,
    ) -> Result<IncidentStatus, DependencyError> {
        let incident = self.fetch_incident(incident_id, false).await?;
        Ok(IncidentStatus {
            incident_id: incident.id,
            status: incident.status,
        })
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

/// Truncate to at most `max` bytes on a character boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
