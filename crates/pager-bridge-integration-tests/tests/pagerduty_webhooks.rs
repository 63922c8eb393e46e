//! Integration tests for PagerDuty webhook delivery
//!
//! Each test drives the HTTP router end to end: signature verification,
//! incident lookup against a mock PagerDuty REST API and message delivery
//! to a mock Slack Web API.

mod common;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use common::{
    incident_event, json_body, mount_channels, mount_incident, mount_post_message,
    pagerduty_headers, post, TestBridge, DIAGNOSTIC_CHANNEL, PD_REST_KEY, PD_SIGNING_KEY,
};
use tower::ServiceExt;

async fn response_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_triggered_incident_posts_notification_with_status_button() {
    let bridge = TestBridge::start().await;
    mount_incident(&bridge.pagerduty, "Q1", Some("ops-room"), "triggered").await;
    mount_channels(&bridge.slack, &[("C0001", "general"), ("C0002", "ops-room")]).await;
    mount_post_message(&bridge.slack).await;

    let body = incident_event("incident.triggered", "Q1", &[]);
    let response = bridge
        .router()
        .oneshot(post(pagerduty_headers(&body, PD_SIGNING_KEY), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "{}");

    let lookups = bridge.pagerduty_calls("/incidents/Q1").await;
    assert_eq!(lookups.len(), 1);
    assert_eq!(
        lookups[0]
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok()),
        Some(format!("Token token={}", PD_REST_KEY).as_str())
    );
    assert!(lookups[0]
        .url
        .query()
        .unwrap_or_default()
        .contains("first_trigger_log_entries"));

    let posts = bridge.slack_calls("chat.postMessage").await;
    assert_eq!(posts.len(), 1);
    let message = json_body(&posts[0]);
    assert_eq!(message["channel"], "C0002");

    let section = &message["blocks"][0];
    let text = section["text"]["text"].as_str().unwrap();
    for expected in ["DB down", "https://x/Q1", "high", "42"] {
        assert!(text.contains(expected), "missing {} in {}", expected, text);
    }
    assert_eq!(section["accessory"]["value"], "Q1");
    assert_eq!(section["accessory"]["action_id"], "pagerduty-status-button");
}

#[tokio::test]
async fn test_lifecycle_updates_have_no_button() {
    let cases = [
        ("incident.acknowledged", vec!["Jane Doe"], "Jane Doe"),
        ("incident.reassigned", vec!["Ann", "Bob"], "Ann, Bob"),
        ("incident.resolved", vec![], "Jane Doe"),
    ];

    for (event_type, assignees, expected_user) in cases {
        let bridge = TestBridge::start().await;
        mount_incident(&bridge.pagerduty, "Q2", Some("C0002"), "resolved").await;
        mount_channels(&bridge.slack, &[("C0002", "ops-room")]).await;
        mount_post_message(&bridge.slack).await;

        let body = incident_event(event_type, "Q2", &assignees);
        let response = bridge
            .router()
            .oneshot(post(pagerduty_headers(&body, PD_SIGNING_KEY), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", event_type);

        let posts = bridge.slack_calls("chat.postMessage").await;
        assert_eq!(posts.len(), 1, "{}", event_type);
        let message = json_body(&posts[0]);
        let section = &message["blocks"][0];
        let text = section["text"]["text"].as_str().unwrap();
        assert!(text.contains(expected_user), "{}: {}", event_type, text);
        assert!(section.get("accessory").is_none(), "{}", event_type);
    }
}

#[tokio::test]
async fn test_incident_not_triggered_from_slack_is_acknowledged_silently() {
    let bridge = TestBridge::start().await;
    mount_incident(&bridge.pagerduty, "Q3", None, "triggered").await;
    mount_post_message(&bridge.slack).await;

    let body = incident_event("incident.triggered", "Q3", &[]);
    let response = bridge
        .router()
        .oneshot(post(pagerduty_headers(&body, PD_SIGNING_KEY), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(bridge.slack_calls("conversations.list").await.is_empty());
    assert!(bridge.slack_calls("chat.postMessage").await.is_empty());
}

#[tokio::test]
async fn test_wrong_signature_is_rejected_before_any_outbound_call() {
    let bridge = TestBridge::start().await;
    mount_incident(&bridge.pagerduty, "Q1", Some("ops-room"), "triggered").await;

    let body = incident_event("incident.triggered", "Q1", &[]);
    let response = bridge
        .router()
        .oneshot(post(pagerduty_headers(&body, "some-other-key"), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response_text(response).await, "{}");
    assert!(bridge.pagerduty_calls("/incidents/Q1").await.is_empty());
}

#[tokio::test]
async fn test_pagerduty_outage_is_reported_as_rejection() {
    let bridge = TestBridge::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .mount(&bridge.pagerduty)
        .await;

    let body = incident_event("incident.resolved", "Q1", &[]);
    let response = bridge
        .router()
        .oneshot(post(pagerduty_headers(&body, PD_SIGNING_KEY), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response_text(response).await, "{}");
}

#[tokio::test]
async fn test_unknown_slack_channel_is_reported_as_rejection() {
    let bridge = TestBridge::start().await;
    mount_incident(&bridge.pagerduty, "Q1", Some("archived-room"), "triggered").await;
    mount_channels(&bridge.slack, &[("C0002", "ops-room")]).await;
    mount_post_message(&bridge.slack).await;

    let body = incident_event("incident.triggered", "Q1", &[]);
    let response = bridge
        .router()
        .oneshot(post(pagerduty_headers(&body, PD_SIGNING_KEY), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(bridge.slack_calls("chat.postMessage").await.is_empty());
}

#[tokio::test]
async fn test_ping_is_acknowledged_in_diagnostic_channel() {
    let bridge = TestBridge::start().await;
    mount_channels(&bridge.slack, &[("CDIAG", DIAGNOSTIC_CHANNEL)]).await;
    mount_post_message(&bridge.slack).await;

    let body = serde_json::json!({
        "event": {
            "id": "01DEN1HNLBC1VITK192ETLPZO2",
            "event_type": "pagey.ping",
            "resource_type": "pagey",
            "occurred_at": "2024-01-01T00:00:00.000Z",
            "agent": null,
            "data": { "message": "Hello from your friend Pagey!", "type": "ping" }
        }
    })
    .to_string();

    let response = bridge
        .router()
        .oneshot(post(pagerduty_headers(&body, PD_SIGNING_KEY), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(bridge.pagerduty.received_requests().await.unwrap().is_empty());

    let posts = bridge.slack_calls("chat.postMessage").await;
    assert_eq!(posts.len(), 1);
    let message = json_body(&posts[0]);
    assert_eq!(message["channel"], "CDIAG");
    assert_eq!(
        message["blocks"][0]["text"]["text"],
        "Received ping event from PagerDuty"
    );
}

#[tokio::test]
async fn test_rotated_secret_signature_is_accepted() {
    let bridge = TestBridge::start().await;
    mount_incident(&bridge.pagerduty, "Q4", None, "triggered").await;

    let body = incident_event("incident.triggered", "Q4", &[]);
    let mut headers = pagerduty_headers(&body, PD_SIGNING_KEY);
    let current = headers
        .get("x-pagerduty-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    headers.insert(
        "x-pagerduty-signature",
        format!("v1=0000000000000000, {}", current).parse().unwrap(),
    );

    let response = bridge.router().oneshot(post(headers, body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_handler_called_directly() {
    let bridge = TestBridge::start().await;
    mount_incident(&bridge.pagerduty, "Q5", None, "triggered").await;

    let body = incident_event("incident.acknowledged", "Q5", &["Jane Doe"]);
    let headers = pagerduty_headers(&body, PD_SIGNING_KEY);

    let result =
        pager_bridge_api::handle_webhook(State(bridge.state.clone()), headers, Bytes::from(body))
            .await;

    assert!(result.is_ok());
    assert_eq!(result.into_response().status(), StatusCode::OK);

    let metrics = bridge.state.metrics.render().unwrap();
    assert!(metrics.contains("notifications_skipped_total 1"));
}
