//! PagerDuty webhook signature verification.
//!
//! PagerDuty signs the raw request body with HMAC-SHA256 and sends one or more
//! signatures in `X-PagerDuty-Signature`, e.g. `v1=abc...,v1=def...`. More than
//! one signature is present while a signing secret is being rotated; a request
//! is authentic when any `v1` signature matches.

use crate::BridgeError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;

/// Header carrying the signatures. Matched case-insensitively.
pub const SIGNATURE_HEADER: &str = "x-pagerduty-signature";

/// Only signatures with this version prefix are considered.
const VERSION_PREFIX: &str = "v1=";

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify `signature_header` against the raw request body.
///
/// The digest is computed over `raw_body` exactly as received; callers must
/// not re-serialize the parsed JSON.
///
/// # Errors
///
/// Returns [`BridgeError::Authentication`] when no `v1=` candidate matches,
/// including when the header is empty or carries only other versions.
#[instrument(skip_all, fields(header_len = signature_header.len(), body_len = raw_body.len()))]
pub fn verify(signature_header: &str, raw_body: &[u8], secret: &str) -> Result<(), BridgeError> {
    let expected = compute_signature(raw_body, secret);

    let mut candidates = 0usize;
    let mut matched = false;
    for candidate in signature_candidates(signature_header) {
        candidates += 1;
        // Evaluate every candidate so timing does not reveal which one matched.
        matched |= constant_time_eq(candidate.as_bytes(), expected.as_bytes());
    }

    if matched {
        Ok(())
    } else {
        debug!(candidates, "No PagerDuty signature matched");
        Err(BridgeError::Authentication)
    }
}

/// Hex digests carried by the `v1=` tokens of a signature header.
pub fn signature_candidates(signature_header: &str) -> impl Iterator<Item = &str> {
    signature_header
        .split(',')
        .map(str::trim)
        .filter_map(|token| token.strip_prefix(VERSION_PREFIX))
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    // Length is not secret; the digest length is fixed.
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
