//! # Webhook Processing Module
//!
//! Inbound PagerDuty webhook pipeline: platform discrimination, signature
//! verification, envelope parsing, routing and delivery to Slack.

pub mod envelope;
pub mod signature;

use crate::{
    chat::ChatClient, credentials::Credentials, router::NotificationRouter, BridgeError,
};
use envelope::WebhookEnvelope;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

// ============================================================================
// Platform discrimination
// ============================================================================

/// Which platform sent an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookPlatform {
    PagerDuty,
    Slack,
}

impl WebhookPlatform {
    /// Classify a request by its headers.
    ///
    /// Header names must already be lowercased. PagerDuty is recognised by
    /// its `User-Agent` prefix or its signature header; anything else is
    /// handed to the Slack adapter, which performs its own verification.
    pub fn from_headers(headers: &HashMap<String, String>) -> Self {
        let pagerduty_agent = headers
            .get("user-agent")
            .is_some_and(|agent| agent.starts_with("PagerDuty"));

        if pagerduty_agent || headers.contains_key(signature::SIGNATURE_HEADER) {
            Self::PagerDuty
        } else {
            Self::Slack
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PagerDuty => "pagerduty",
            Self::Slack => "slack",
        }
    }
}

/// Lowercase header names so lookups are case-insensitive.
pub fn normalize_headers<'a>(
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> HashMap<String, String> {
    headers
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect()
}

// ============================================================================
// Incident webhook handler
// ============================================================================

/// Result of handling one PagerDuty delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A notification was posted.
    Delivered {
        channel_id: String,
        event_type: &'static str,
    },
    /// The incident is not managed by the bridge.
    Skipped,
}

/// Verifies, parses, routes and delivers PagerDuty webhooks.
#[derive(Clone)]
pub struct IncidentWebhookHandler {
    credentials: Arc<Credentials>,
    router: NotificationRouter,
    chat: Arc<dyn ChatClient>,
}

impl IncidentWebhookHandler {
    pub fn new(
        credentials: Arc<Credentials>,
        router: NotificationRouter,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self {
            credentials,
            router,
            chat,
        }
    }

    /// Handle one delivery end to end.
    ///
    /// At most one message is posted. The signature is checked against the
    /// raw body before anything is parsed.
    #[instrument(skip_all, fields(body_len = raw_body.len()))]
    pub async fn handle(
        &self,
        headers: &HashMap<String, String>,
        raw_body: &[u8],
    ) -> Result<DispatchOutcome, BridgeError> {
        info!("Received event from PagerDuty");

        let signature_header = headers
            .get(signature::SIGNATURE_HEADER)
            .map(String::as_str)
            .unwrap_or_default();
        signature::verify(
            signature_header,
            raw_body,
            self.credentials.pagerduty.signing_key.expose_secret(),
        )?;

        let envelope = envelope::parse(raw_body)?;
        let event_type = match &envelope {
            WebhookEnvelope::Pagey => "pagey.ping",
            WebhookEnvelope::Incident(event) => event.event_type().as_str(),
        };

        let Some(notification) = self.router.route(&envelope).await? else {
            return Ok(DispatchOutcome::Skipped);
        };

        let channel_id = self.chat.find_channel_id(&notification.channel).await?;
        self.chat
            .post_message(&channel_id, &notification.to_message())
            .await?;

        info!(channel_id = %channel_id, event_type, "Notification delivered");
        Ok(DispatchOutcome::Delivered {
            channel_id,
            event_type,
        })
    }
}
