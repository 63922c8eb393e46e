//! Metrics collection for the API service.
//!
//! Metrics live in a per-instance [`Registry`] so several application states
//! can coexist in one process.

use pager_bridge_core::webhook::{DispatchOutcome, WebhookPlatform};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Service metrics for observability
#[derive(Debug)]
pub struct BridgeMetrics {
    registry: Registry,

    pub webhooks_received_total: IntCounterVec,
    pub webhook_rejections_total: IntCounterVec,
    pub notifications_sent_total: IntCounterVec,
    pub notifications_skipped_total: IntCounter,
    pub slack_commands_total: IntCounterVec,
    pub slack_command_failures_total: IntCounter,
}

impl BridgeMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let webhooks_received_total = IntCounterVec::new(
            Opts::new("webhooks_received_total", "Inbound requests by platform"),
            &["platform"],
        )?;
        let webhook_rejections_total = IntCounterVec::new(
            Opts::new("webhook_rejections_total", "Rejected requests by error kind"),
            &["kind"],
        )?;
        let notifications_sent_total = IntCounterVec::new(
            Opts::new(
                "notifications_sent_total",
                "Slack notifications posted by PagerDuty event type",
            ),
            &["event_type"],
        )?;
        let notifications_skipped_total = IntCounter::new(
            "notifications_skipped_total",
            "PagerDuty events for incidents not triggered from Slack",
        )?;
        let slack_commands_total = IntCounterVec::new(
            Opts::new("slack_commands_total", "Handled Slack commands by intent"),
            &["intent"],
        )?;
        let slack_command_failures_total = IntCounter::new(
            "slack_command_failures_total",
            "Slack commands that failed after acknowledgement",
        )?;

        registry.register(Box::new(webhooks_received_total.clone()))?;
        registry.register(Box::new(webhook_rejections_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notifications_skipped_total.clone()))?;
        registry.register(Box::new(slack_commands_total.clone()))?;
        registry.register(Box::new(slack_command_failures_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            webhooks_received_total,
            webhook_rejections_total,
            notifications_sent_total,
            notifications_skipped_total,
            slack_commands_total,
            slack_command_failures_total,
        }))
    }

    pub fn record_received(&self, platform: WebhookPlatform) {
        self.webhooks_received_total
            .with_label_values(&[platform.as_str()])
            .inc();
    }

    pub fn record_rejection(&self, kind: &str) {
        self.webhook_rejections_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_dispatch(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered { event_type, .. } => self
                .notifications_sent_total
                .with_label_values(&[*event_type])
                .inc(),
            DispatchOutcome::Skipped => self.notifications_skipped_total.inc(),
        }
    }

    pub fn record_command(&self, intent: &str) {
        self.slack_commands_total
            .with_label_values(&[intent])
            .inc();
    }

    pub fn record_command_failure(&self) {
        self.slack_command_failures_total.inc();
    }

    /// Prometheus text exposition of every metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
