//! PagerDuty V3 webhook envelope types.
//!
//! The payload is `{"event": {...}}` where the event is discriminated first by
//! `resource_type` and then, for incidents, by `event_type`. Decoding is strict:
//! an unknown `resource_type` or `event_type` is an error.

use crate::{BridgeError, IncidentId};
use serde::Deserialize;
use std::fmt;

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

/// Outer PagerDuty webhook body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct WebhookPayload {
    event: WebhookEnvelope,
}

/// A decoded PagerDuty webhook event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resource_type", rename_all = "lowercase")]
pub enum WebhookEnvelope {
    /// Connectivity check sent when a subscription is created or tested.
    Pagey,

    Incident(IncidentEvent),
}

/// Incident lifecycle events the bridge understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event_type")]
pub enum IncidentEvent {
    #[serde(rename = "incident.triggered")]
    Triggered { agent: Agent, data: IncidentData },

    #[serde(rename = "incident.acknowledged")]
    Acknowledged {
        agent: Agent,
        data: AssignedIncidentData,
    },

    #[serde(rename = "incident.reassigned")]
    Reassigned {
        agent: Agent,
        data: AssignedIncidentData,
    },

    #[serde(rename = "incident.resolved")]
    Resolved { agent: Agent, data: IncidentData },
}

impl IncidentEvent {
    pub fn event_type(&self) -> IncidentEventType {
        match self {
            Self::Triggered { .. } => IncidentEventType::Triggered,
            Self::Acknowledged { .. } => IncidentEventType::Acknowledged,
            Self::Reassigned { .. } => IncidentEventType::Reassigned,
            Self::Resolved { .. } => IncidentEventType::Resolved,
        }
    }

    /// Incident fields common to every event type.
    pub fn incident(&self) -> &IncidentData {
        match self {
            Self::Triggered { data, .. } | Self::Resolved { data, .. } => data,
            Self::Acknowledged { data, .. } | Self::Reassigned { data, .. } => &data.incident,
        }
    }

    pub fn agent(&self) -> &Agent {
        match self {
            Self::Triggered { agent, .. }
            | Self::Acknowledged { agent, .. }
            | Self::Reassigned { agent, .. }
            | Self::Resolved { agent, .. } => agent,
        }
    }
}

/// Field-less discriminant of [`IncidentEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentEventType {
    Triggered,
    Acknowledged,
    Reassigned,
    Resolved,
}

impl IncidentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triggered => "incident.triggered",
            Self::Acknowledged => "incident.acknowledged",
            Self::Reassigned => "incident.reassigned",
            Self::Resolved => "incident.resolved",
        }
    }
}

impl fmt::Display for IncidentEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user or service that caused the event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Agent {
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncidentData {
    pub id: IncidentId,
    pub html_url: String,
    pub number: u64,
    pub title: String,
    pub urgency: String,
}

/// Incident data for events that change assignment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignedIncidentData {
    #[serde(flatten)]
    pub incident: IncidentData,
    pub assignees: Vec<Assignee>,
}

impl AssignedIncidentData {
    /// Assignee display names joined with `", "`.
    pub fn assignee_names(&self) -> String {
        self.assignees
            .iter()
            .map(|a| a.summary.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Assignee {
    pub summary: String,
}

/// Decode a raw PagerDuty webhook body.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedPayload`] for invalid JSON, a missing
/// `event`, an unknown `resource_type` or `event_type`, or missing fields.
pub fn parse(raw_body: &[u8]) -> Result<WebhookEnvelope, BridgeError> {
    serde_json::from_slice::<WebhookPayload>(raw_body)
        .map(|payload| payload.event)
        .map_err(|e| BridgeError::malformed(format!("invalid PagerDuty webhook: {}", e)))
}
