//! # Chat Commands
//!
//! Turns Slack mentions, slash commands and button clicks into
//! [`ChatIntent`]s and carries them out. Replies go to the channel the
//! request came from; failures are returned, never posted.

use super::{
    inbound::{AppMention, InteractionPayload, SlashCommand},
    ChatClient, ChatMessage,
};
use crate::{
    incident::IncidentDirectory,
    router::STATUS_BUTTON_ACTION_ID,
    templates::{TemplateKind, TemplateRenderer},
    BridgeError, IncidentId,
};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(?P<bot>[^>]+)>(?P<message>[\s\S]*)").expect("mention pattern is valid")
});

/// Keyword that turns a message into an escalation.
pub const ESCALATE_KEYWORD: &str = "escalate";

/// Fallback text of the escalation confirmation.
pub const ESCALATION_FALLBACK: &str = "Incident triggered";

/// What a Slack user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatIntent {
    Help { user: String, bot_name: String },
    Ping { user: String },
    /// `text` is the full trimmed message, keyword included
    Escalate {
        user: String,
        text: String,
        channel: String,
    },
    StatusQuery { user: String, incident_id: IncidentId },
}

impl ChatIntent {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Help { .. } => "help",
            Self::Ping { .. } => "ping",
            Self::Escalate { .. } => "escalate",
            Self::StatusQuery { .. } => "status_query",
        }
    }
}

/// Bot name and message body of a mention.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MentionText {
    pub bot_name: String,
    pub message: String,
}

/// Split `<@BOT> rest` into bot name and trimmed body.
///
/// Text without a mention yields empty fields.
pub fn extract_mention(raw: &str) -> MentionText {
    MENTION
        .captures(raw)
        .map(|caps| MentionText {
            bot_name: caps["bot"].to_string(),
            message: caps["message"].trim().to_string(),
        })
        .unwrap_or_default()
}

/// Classify free text.
///
/// Unrecognised text is not an error; it falls back to help.
pub fn parse_intent(
    text: Option<&str>,
    user: &str,
    bot_name: &str,
    channel: &str,
    ping_phrase: &str,
) -> ChatIntent {
    let text = text.map(str::trim).unwrap_or_default();

    if text == ping_phrase && !text.is_empty() {
        ChatIntent::Ping {
            user: user.to_string(),
        }
    } else if text.starts_with(ESCALATE_KEYWORD) {
        ChatIntent::Escalate {
            user: user.to_string(),
            text: text.to_string(),
            channel: channel.to_string(),
        }
    } else {
        ChatIntent::Help {
            user: user.to_string(),
            bot_name: bot_name.to_string(),
        }
    }
}

/// Executes chat intents against PagerDuty and replies in Slack.
#[derive(Clone)]
pub struct CommandHandler {
    directory: Arc<dyn IncidentDirectory>,
    chat: Arc<dyn ChatClient>,
    renderer: Arc<TemplateRenderer>,
    command: String,
    ping_phrase: String,
}

impl CommandHandler {
    pub fn new(
        directory: Arc<dyn IncidentDirectory>,
        chat: Arc<dyn ChatClient>,
        renderer: Arc<TemplateRenderer>,
        command: impl Into<String>,
        ping_phrase: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            chat,
            renderer,
            command: command.into(),
            ping_phrase: ping_phrase.into(),
        }
    }

    /// Handle an `app_mention` event.
    #[instrument(skip(self, mention), fields(channel = %mention.channel))]
    pub async fn handle_mention(&self, mention: &AppMention) -> Result<ChatIntent, BridgeError> {
        let parsed = extract_mention(mention.text.as_deref().unwrap_or_default());
        let intent = parse_intent(
            Some(&parsed.message),
            mention.user_label(),
            &parsed.bot_name,
            &mention.channel,
            &self.ping_phrase,
        );

        self.execute(&intent, &mention.channel).await?;
        Ok(intent)
    }

    /// Handle a slash command. Commands other than the configured one are
    /// ignored and yield `Ok(None)`.
    #[instrument(skip(self, command), fields(command = %command.command))]
    pub async fn handle_slash_command(
        &self,
        command: &SlashCommand,
    ) -> Result<Option<ChatIntent>, BridgeError> {
        if command.command != self.command {
            debug!(expected = %self.command, "Ignoring unknown slash command");
            return Ok(None);
        }

        let intent = parse_intent(
            Some(&command.text),
            &command.user_id,
            self.command.trim_start_matches('/'),
            &command.channel_id,
            &self.ping_phrase,
        );

        self.execute(&intent, &command.channel_id).await?;
        Ok(Some(intent))
    }

    /// Handle an interactive callback.
    ///
    /// Only clicks on the status button produce a reply; every other action
    /// is logged and yields `Ok(None)`.
    #[instrument(skip(self, payload), fields(kind = %payload.kind, user = %payload.user.id))]
    pub async fn handle_action(
        &self,
        payload: &InteractionPayload,
    ) -> Result<Option<ChatIntent>, BridgeError> {
        let Some(action) = payload.button_action() else {
            info!("Ignoring non-button interaction");
            return Ok(None);
        };
        if action.action_id != STATUS_BUTTON_ACTION_ID {
            info!(action_id = %action.action_id, "Ignoring unknown button");
            return Ok(None);
        }

        let incident_id = action
            .value
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| BridgeError::malformed("Status button carries no incident ID"))?;
        let channel = payload
            .channel
            .as_ref()
            .map(|channel| channel.id.as_str())
            .ok_or_else(|| BridgeError::malformed("Interaction has no channel"))?;

        let intent = ChatIntent::StatusQuery {
            user: payload.user.id.clone(),
            incident_id: IncidentId::new(incident_id),
        };

        self.execute(&intent, channel).await?;
        Ok(Some(intent))
    }

    async fn execute(&self, intent: &ChatIntent, reply_channel: &str) -> Result<(), BridgeError> {
        let message = match intent {
            ChatIntent::Help { user, bot_name } => ChatMessage::plain(self.renderer.render(
                TemplateKind::Help,
                &[("user", user.as_str()), ("app", bot_name.as_str())],
            )?),
            ChatIntent::Ping { user } => {
                ChatMessage::plain(format!("received ping from <@{}> :wave:", user))
            }
            ChatIntent::Escalate {
                user,
                text,
                channel,
            } => {
                self.directory.trigger_incident(text, channel).await?;
                info!(channel = %channel, "Incident triggered from Slack");

                let body = self.renderer.render(
                    TemplateKind::UserTriggered,
                    &[("user", user.as_str()), ("text", text.as_str())],
                )?;
                ChatMessage::section(body, ESCALATION_FALLBACK)
            }
            ChatIntent::StatusQuery { user, incident_id } => {
                let status = self.directory.get_incident(incident_id).await?;
                ChatMessage::plain(self.renderer.render(
                    TemplateKind::IncidentStatus,
                    &[
                        ("user", user.as_str()),
                        ("incidentId", incident_id.as_str()),
                        ("status", status.status.as_str()),
                    ],
                )?)
            }
        };

        if let Err(e) = self.chat.post_message(reply_channel, &message).await {
            warn!(error = %e, "Failed to reply in Slack");
            return Err(e.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("command", &self.command)
            .field("ping_phrase", &self.ping_phrase)
            .finish_non_exhaustive()
    }
}
