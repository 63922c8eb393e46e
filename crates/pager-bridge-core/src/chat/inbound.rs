//! Slack inbound payloads.
//!
//! Slack delivers three shapes to the same endpoint:
//! - JSON Events API bodies (`url_verification`, `event_callback`)
//! - form-encoded interactive callbacks carrying a JSON `payload` field
//! - form-encoded slash commands

use crate::BridgeError;
use serde::Deserialize;
use std::collections::HashMap;

#[cfg(test)]
#[path = "inbound_tests.rs"]
mod tests;

/// Events API body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    /// Endpoint ownership check sent when the request URL is configured.
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Unsupported,
}

/// Inner event of an `event_callback`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    AppMention(AppMention),
    #[serde(other)]
    Unsupported,
}

/// `app_mention` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppMention {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub channel: String,
}

impl AppMention {
    /// Display name when present, otherwise the user ID, otherwise empty.
    pub fn user_label(&self) -> &str {
        self.username
            .as_deref()
            .or(self.user.as_deref())
            .unwrap_or_default()
    }
}

/// Interactive callback (`payload` form field).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: InteractionUser,
    #[serde(default)]
    pub channel: Option<InteractionChannel>,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionUser {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionChannel {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl InteractionPayload {
    /// First action when this is a `block_actions` button click.
    pub fn button_action(&self) -> Option<&BlockAction> {
        if self.kind != "block_actions" {
            return None;
        }
        self.actions.first().filter(|action| action.kind == "button")
    }
}

/// Slash command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
}

/// A decoded Slack request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackRequest {
    UrlVerification { challenge: String },
    Mention(AppMention),
    Interaction(InteractionPayload),
    SlashCommand(SlashCommand),
    /// Valid but not handled by the bridge
    Ignored,
}

/// Decode a verified Slack request body.
///
/// JSON bodies are Events API deliveries; anything else is treated as a form.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedPayload`] when the body matches none of
/// the known shapes.
pub fn parse_request(body: &[u8]) -> Result<SlackRequest, BridgeError> {
    if body.trim_ascii_start().starts_with(b"{") {
        let envelope: SlackEnvelope = serde_json::from_slice(body)
            .map_err(|e| BridgeError::malformed(format!("Slack event body: {}", e)))?;
        return Ok(match envelope {
            SlackEnvelope::UrlVerification { challenge } => {
                SlackRequest::UrlVerification { challenge }
            }
            SlackEnvelope::EventCallback {
                event: SlackEvent::AppMention(mention),
            } => SlackRequest::Mention(mention),
            SlackEnvelope::EventCallback {
                event: SlackEvent::Unsupported,
            }
            | SlackEnvelope::Unsupported => SlackRequest::Ignored,
        });
    }

    let mut form = parse_form_body(body);

    if let Some(payload) = form.remove("payload") {
        let interaction: InteractionPayload = serde_json::from_str(&payload)
            .map_err(|e| BridgeError::malformed(format!("Slack interaction payload: {}", e)))?;
        return Ok(SlackRequest::Interaction(interaction));
    }

    match form.remove("command") {
        Some(command) => Ok(SlackRequest::SlashCommand(SlashCommand {
            command,
            text: form.remove("text").unwrap_or_default(),
            user_id: form.remove("user_id").unwrap_or_default(),
            channel_id: form.remove("channel_id").unwrap_or_default(),
        })),
        None => Err(BridgeError::malformed("Unrecognised Slack request body")),
    }
}

/// Decode an `application/x-www-form-urlencoded` body. Later keys win.
pub fn parse_form_body(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}
