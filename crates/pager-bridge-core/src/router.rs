//! # Notification Router
//!
//! Decides which Slack notification, if any, a verified PagerDuty event
//! produces. Routing is sequential: resolve the channel, render the
//! template, build the notification. Nothing is sent from here.

use crate::{
    chat::{ChatMessage, DEFAULT_FALLBACK_TEXT},
    incident::IncidentDirectory,
    templates::{TemplateKind, TemplateRenderer},
    webhook::envelope::{IncidentEvent, WebhookEnvelope},
    BridgeError, IncidentId,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

/// Action ID of the status button; button callbacks are matched on it.
pub const STATUS_BUTTON_ACTION_ID: &str = "pagerduty-status-button";

/// Label of the status button.
pub const STATUS_BUTTON_LABEL: &str = "Check Status of the alert";

/// Fixed text posted to the diagnostic channel for PagerDuty pings.
pub const PING_ACKNOWLEDGEMENT: &str = "Received ping event from PagerDuty";

/// Clickable control attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveControl {
    pub action_id: &'static str,
    pub label: &'static str,
    /// Carried back verbatim in the click callback
    pub incident_id: IncidentId,
}

impl InteractiveControl {
    /// "Check status" button for `incident_id`.
    pub fn status_button(incident_id: IncidentId) -> Self {
        Self {
            action_id: STATUS_BUTTON_ACTION_ID,
            label: STATUS_BUTTON_LABEL,
            incident_id,
        }
    }
}

/// A fully rendered notification for one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundNotification {
    /// Channel name or ID as recorded at trigger time
    pub channel: String,
    pub text: String,
    pub control: Option<InteractiveControl>,
}

impl OutboundNotification {
    pub fn to_message(&self) -> ChatMessage {
        let message = ChatMessage::section(self.text.clone(), DEFAULT_FALLBACK_TEXT);
        match &self.control {
            Some(control) => message.with_control(control.clone()),
            None => message,
        }
    }
}

/// Maps PagerDuty events to Slack notifications.
#[derive(Clone)]
pub struct NotificationRouter {
    directory: Arc<dyn IncidentDirectory>,
    renderer: Arc<TemplateRenderer>,
    diagnostic_channel: String,
}

impl NotificationRouter {
    pub fn new(
        directory: Arc<dyn IncidentDirectory>,
        renderer: Arc<TemplateRenderer>,
        diagnostic_channel: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            renderer,
            diagnostic_channel: diagnostic_channel.into(),
        }
    }

    /// Produce the notification for `envelope`.
    ///
    /// Returns `Ok(None)` when the incident was not triggered through the
    /// bridge. Any directory or template failure aborts routing as a whole.
    #[instrument(skip(self, envelope))]
    pub async fn route(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<Option<OutboundNotification>, BridgeError> {
        let event = match envelope {
            WebhookEnvelope::Pagey => {
                debug!(channel = %self.diagnostic_channel, "Routing PagerDuty ping");
                return Ok(Some(OutboundNotification {
                    channel: self.diagnostic_channel.clone(),
                    text: PING_ACKNOWLEDGEMENT.to_string(),
                    control: None,
                }));
            }
            WebhookEnvelope::Incident(event) => event,
        };

        let incident = event.incident();
        let Some(channel) = self.directory.resolve_channel(&incident.id).await? else {
            info!(
                incident_id = %incident.id,
                event_type = %event.event_type(),
                "Incident was not triggered from Slack; no notification"
            );
            return Ok(None);
        };

        let text = self.render(event)?;
        let control = match event {
            IncidentEvent::Triggered { data, .. } => {
                Some(InteractiveControl::status_button(data.id.clone()))
            }
            IncidentEvent::Acknowledged { .. }
            | IncidentEvent::Reassigned { .. }
            | IncidentEvent::Resolved { .. } => None,
        };

        Ok(Some(OutboundNotification {
            channel,
            text,
            control,
        }))
    }

    fn render(&self, event: &IncidentEvent) -> Result<String, BridgeError> {
        let incident = event.incident();
        let number = incident.number.to_string();
        let common = [
            ("title", incident.title.as_str()),
            ("html_url", incident.html_url.as_str()),
            ("number", number.as_str()),
        ];

        let rendered = match event {
            IncidentEvent::Triggered { data, .. } => self.renderer.render(
                TemplateKind::IncidentTriggered,
                &[
                    common[0],
                    common[1],
                    common[2],
                    ("id", data.id.as_str()),
                    ("urgency", data.urgency.as_str()),
                ],
            ),
            IncidentEvent::Acknowledged { agent, .. } => self.renderer.render(
                TemplateKind::IncidentAcknowledged,
                &[common[0], common[1], common[2], ("user", agent.summary.as_str())],
            ),
            IncidentEvent::Reassigned { data, .. } => {
                let assignees = data.assignee_names();
                self.renderer.render(
                    TemplateKind::IncidentReassigned,
                    &[common[0], common[1], common[2], ("user", assignees.as_str())],
                )
            }
            IncidentEvent::Resolved { agent, .. } => self.renderer.render(
                TemplateKind::IncidentResolved,
                &[common[0], common[1], common[2], ("user", agent.summary.as_str())],
            ),
        }?;

        Ok(rendered)
    }
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("diagnostic_channel", &self.diagnostic_channel)
            .finish_non_exhaustive()
    }
}
