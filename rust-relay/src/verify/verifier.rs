//! Authoritative webhook verifier.
//!
//! Runs only where the byte-exact body is available (the webhook handler).

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use super::signature::verify_signed_payload;
use super::types::{DenyReason, SignatureEncoding, Verdict, VerificationRequest};
use super::window::{parse_timestamp, TimestampWindow};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::keys::KeyCache;

/// Verifies webhook deliveries against the cached trusted key.
#[derive(Clone)]
pub struct WebhookVerifier {
    keys: KeyCache,
    clock: Arc<dyn Clock>,
    window: TimestampWindow,
    encoding: SignatureEncoding,
}

impl WebhookVerifier {
    pub fn new(keys: KeyCache, window: TimestampWindow) -> Self {
        Self {
            keys,
            clock: Arc::new(SystemClock),
            window,
            encoding: SignatureEncoding::Base64,
        }
    }

    pub fn from_config(config: &Config, keys: KeyCache) -> Self {
        Self::new(keys, TimestampWindow::new(config.signature_tolerance_secs))
            .with_encoding(config.signature_encoding)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_encoding(mut self, encoding: SignatureEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Verify one delivery. Never fails: every problem is a [`Verdict::Denied`].
    pub async fn verify(&self, request: &VerificationRequest) -> Verdict {
        let body_sha256 = hex::encode(Sha256::digest(&request.raw_body));

        // Reject unparsable timestamps before touching the secret store.
        if let Err(reason) = parse_timestamp(&request.timestamp) {
            return self.deny(reason, &body_sha256, None);
        }

        let key = match self.keys.get_trusted_key().await {
            Ok(key) => key,
            Err(e) => {
                error!(
                    secret_name = %self.keys.secret_name(),
                    error = %e,
                    "public_key_fetch_failed"
                );
                return self.deny(DenyReason::KeyUnavailable, &body_sha256, None);
            }
        };

        let now = self.clock.now();
        let verdict = verify_signed_payload(key.verifying_key(), request, &self.window, now, self.encoding);

        match &verdict {
            Verdict::Allowed(auth) => info!(
                timestamp = auth.timestamp(),
                body_length = request.raw_body.len(),
                body_sha256 = %body_sha256,
                key_fingerprint = %key.fingerprint(),
                "signature_verified"
            ),
            Verdict::Denied(reason) => {
                self.deny(reason.clone(), &body_sha256, Some(now));
            }
        }

        verdict
    }

    fn deny(&self, reason: DenyReason, body_sha256: &str, now: Option<i64>) -> Verdict {
        if reason.is_operational() {
            error!(
                deny_reason = reason.as_str(),
                fault = reason.fault(),
                body_sha256 = %body_sha256,
                "signature_denied"
            );
        } else {
            warn!(
                deny_reason = reason.as_str(),
                fault = reason.fault(),
                body_sha256 = %body_sha256,
                now = ?now,
                tolerance_secs = self.window.tolerance_secs(),
                "signature_denied"
            );
        }
        Verdict::Denied(reason)
    }
}
