//! Slack request signing (`v0`).
//!
//! Slack signs `v0:{timestamp}:{raw body}` with the app signing secret and
//! sends the hex digest in `X-Slack-Signature` as `v0=<hex>`, alongside the
//! Unix timestamp in `X-Slack-Request-Timestamp`.

use crate::{
    webhook::signature::{compute_signature, constant_time_eq},
    BridgeError,
};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "verification_tests.rs"]
mod tests;

/// Header carrying the `v0=` signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Header carrying the Unix timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const VERSION: &str = "v0";

/// Compute the `v0=<hex>` signature Slack would send for `body`.
pub fn sign_request(timestamp: &str, body: &[u8], secret: &str) -> String {
    let mut base = Vec::with_capacity(VERSION.len() + timestamp.len() + body.len() + 2);
    base.extend_from_slice(VERSION.as_bytes());
    base.push(b':');
    base.extend_from_slice(timestamp.as_bytes());
    base.push(b':');
    base.extend_from_slice(body);

    format!("{}={}", VERSION, compute_signature(&base, secret))
}

/// Verify a Slack request.
///
/// Requests whose timestamp is more than `max_age_seconds` away from `now`
/// are rejected even if the signature matches.
///
/// # Errors
///
/// Returns [`BridgeError::Authentication`] for a missing, stale or wrong
/// signature. No detail is carried.
#[instrument(skip_all, fields(body_len = body.len()))]
pub fn verify_slack_request(
    signature: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
    secret: &str,
    max_age_seconds: i64,
    now: DateTime<Utc>,
) -> Result<(), BridgeError> {
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        debug!("Slack signature headers missing");
        return Err(BridgeError::Authentication);
    };

    let Ok(sent_at) = timestamp.trim().parse::<i64>() else {
        debug!("Slack timestamp is not an integer");
        return Err(BridgeError::Authentication);
    };
    if now.timestamp().abs_diff(sent_at) > max_age_seconds.unsigned_abs() {
        debug!(sent_at, "Slack request outside the accepted window");
        return Err(BridgeError::Authentication);
    }

    let expected = sign_request(timestamp.trim(), body, secret);
    if constant_time_eq(signature.trim().as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        debug!("Slack signature mismatch");
        Err(BridgeError::Authentication)
    }
}
