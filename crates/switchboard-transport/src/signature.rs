//! Webhook request signature verification.
//!
//! Inbound webhooks are signed with HMAC-SHA256 over
//! `"v0:{timestamp}:{raw body}"` keyed by the app's signing secret; the
//! hex digest travels in the signature header prefixed with `v0=`.
//! Requests older than the staleness window are rejected regardless of
//! signature validity to blunt replay.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{TransportError, TransportResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
/// Header carrying the request timestamp (unix seconds).
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Maximum accepted request age in seconds.
const STALENESS_WINDOW_SECS: i64 = 300;

/// Verifies webhook signatures for one signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    /// Creates a verifier over the app's signing secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies a request against the current wall clock.
    pub fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> TransportResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.verify_at(timestamp, body, signature, now)
    }

    /// Verifies a request against an explicit clock reading.
    pub fn verify_at(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
        now_secs: i64,
    ) -> TransportResult<()> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| TransportError::signature("timestamp is not a number"))?;

        let age = now_secs - ts;
        if age.abs() > STALENESS_WINDOW_SECS {
            return Err(TransportError::signature(format!(
                "timestamp is {age}s from now (limit {STALENESS_WINDOW_SECS}s)"
            )));
        }

        let expected = self.compute(timestamp, body);
        if expected.as_bytes().ct_eq(signature.trim().as_bytes()).into() {
            Ok(())
        } else {
            Err(TransportError::signature("digest mismatch"))
        }
    }

    /// Computes the expected signature header value for a request.
    pub fn compute(&self, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(b"v0:");
        mac.update(timestamp.trim().as_bytes());
        mac.update(b":");
        mac.update(body);
        let digest = mac.finalize().into_bytes();

        let mut out = String::with_capacity(3 + digest.len() * 2);
        out.push_str("v0=");
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("SignatureVerifier").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    #[test]
    fn accepts_a_fresh_correctly_signed_request() {
        let verifier = SignatureVerifier::new(SECRET);
        let body = br#"{"type":"event_callback"}"#;
        let signature = verifier.compute("1531420618", body);
        verifier
            .verify_at("1531420618", body, &signature, 1531420618 + 30)
            .unwrap();
    }

    #[test]
    fn rejects_a_stale_timestamp_with_a_correct_signature() {
        let verifier = SignatureVerifier::new(SECRET);
        let body = br#"{"type":"event_callback"}"#;
        let signature = verifier.compute("1531420618", body);
        let err = verifier
            .verify_at("1531420618", body, &signature, 1531420618 + 400)
            .unwrap_err();
        assert!(matches!(err, TransportError::Signature { .. }));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let verifier = SignatureVerifier::new(SECRET);
        let signature = verifier.compute("1531420618", b"original");
        let err = verifier
            .verify_at("1531420618", b"tampered", &signature, 1531420618)
            .unwrap_err();
        assert!(matches!(err, TransportError::Signature { .. }));
    }

    #[test]
    fn rejects_a_garbage_timestamp() {
        let verifier = SignatureVerifier::new(SECRET);
        let err = verifier
            .verify_at("not-a-number", b"{}", "v0=00", 0)
            .unwrap_err();
        assert!(matches!(err, TransportError::Signature { .. }));
    }
}
