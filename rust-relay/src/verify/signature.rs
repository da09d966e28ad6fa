//! Ed25519 webhook signature verification.
//!
//! The upstream signer signs `timestamp | "|" | raw body` with its Ed25519
//! private key and sends the base64 signature and the timestamp in two headers.
//! Reference: https://developers.telnyx.com/docs/messaging/messages/receiving-webhooks

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};

use super::types::{Authorized, DenyReason, SignatureEncoding, Verdict, VerificationRequest};
use super::window::{parse_timestamp, TimestampWindow};

/// Separator between the timestamp and the body in the signed message.
pub const SIGNED_PAYLOAD_SEPARATOR: u8 = b'|';

/// Build the exact byte sequence the signer signed.
pub fn signed_message(timestamp: &str, raw_body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + 1 + raw_body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.push(SIGNED_PAYLOAD_SEPARATOR);
    message.extend_from_slice(raw_body);
    message
}

/// Decode text in the given encoding, `None` on any malformation.
pub fn decode_bytes(encoding: SignatureEncoding, value: &str) -> Option<Vec<u8>> {
    match encoding {
        SignatureEncoding::Base64 => STANDARD.decode(value).ok(),
        SignatureEncoding::Hex => hex::decode(value).ok(),
    }
}

/// Decode a signature header into an Ed25519 signature.
pub fn decode_signature(encoding: SignatureEncoding, value: &str) -> Result<Signature, DenyReason> {
    let bytes = decode_bytes(encoding, value).ok_or(DenyReason::BadSignature)?;
    Signature::from_slice(&bytes).map_err(|_| DenyReason::BadSignature)
}

/// Verify a webhook delivery against a trusted key at time `now`.
///
/// Checks run in order: timestamp parse, signature decode, signature
/// verification, replay window. The first failure decides the verdict.
pub fn verify_signed_payload(
    key: &VerifyingKey,
    request: &VerificationRequest,
    window: &TimestampWindow,
    now: i64,
    encoding: SignatureEncoding,
) -> Verdict {
    match check(key, request, window, now, encoding) {
        Ok(authorized) => Verdict::Allowed(authorized),
        Err(reason) => Verdict::Denied(reason),
    }
}

fn check(
    key: &VerifyingKey,
    request: &VerificationRequest,
    window: &TimestampWindow,
    now: i64,
    encoding: SignatureEncoding,
) -> Result<Authorized, DenyReason> {
    let timestamp = parse_timestamp(&request.timestamp)?;
    let signature = decode_signature(encoding, &request.signature)?;

    let message = signed_message(&request.timestamp, &request.raw_body);
    key.verify_strict(&message, &signature)
        .map_err(|_| DenyReason::BadSignature)?;

    window.check(timestamp, now)?;

    Ok(Authorized { timestamp })
}
