//! Webhook signature verification.
//!
//! Two placements share this module:
//! - the early gate ([`prefilter`]) sees headers only and may reject, never allow;
//! - the webhook handler ([`WebhookVerifier`]) holds the raw body and makes the
//!   final decision.
//!
//! ## Flow
//!
//! ```text
//! Received → PreFiltered → Verified{Allowed|Denied} → processed | 401
//! ```

pub mod prefilter;
pub mod signature;
pub mod types;
pub mod verifier;
pub mod window;

pub use prefilter::{PreFilterOutcome, PreFilterPolicy, PreFiltered};
pub use signature::{decode_bytes, decode_signature, signed_message, verify_signed_payload};
pub use types::{Authorized, DenyReason, HeaderNames, SignatureEncoding, Verdict, VerificationRequest};
pub use verifier::WebhookVerifier;
pub use window::{parse_timestamp, TimestampWindow};
