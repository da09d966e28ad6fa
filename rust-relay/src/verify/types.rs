//! Request-scoped verification types.

use std::fmt;
use std::str::FromStr;

use axum::body::Bytes;
use axum::http::HeaderMap;

/// Text encoding of a signature or key on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureEncoding {
    #[default]
    Base64,
    Hex,
}

impl FromStr for SignatureEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            other => Err(format!("unknown encoding: {other}")),
        }
    }
}

/// Names of the two headers the upstream signer sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    pub signature: String,
    pub timestamp: String,
}

impl HeaderNames {
    pub fn new(signature: &str, timestamp: &str) -> Self {
        Self {
            signature: signature.to_ascii_lowercase(),
            timestamp: timestamp.to_ascii_lowercase(),
        }
    }
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self::new("telnyx-signature-ed25519", "telnyx-timestamp")
    }
}

/// Why a request was denied.
///
/// Only [`DenyReason::KeyUnavailable`] is an operational fault; the rest are
/// caused by whoever sent the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// A required header is absent or empty
    MissingHeader(String),
    /// The timestamp header is not an integer
    MalformedTimestamp,
    /// The timestamp is too far in the past or the future
    TimestampOutOfWindow,
    /// The signature does not decode or does not verify
    BadSignature,
    /// The trusted key could not be obtained
    KeyUnavailable,
    /// The source address is outside the allow-list (early gate only)
    SourceNotAllowed,
}

impl DenyReason {
    /// Stable identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingHeader(_) => "missing_header",
            DenyReason::MalformedTimestamp => "malformed_timestamp",
            DenyReason::TimestampOutOfWindow => "timestamp_out_of_window",
            DenyReason::BadSignature => "bad_signature",
            DenyReason::KeyUnavailable => "key_unavailable",
            DenyReason::SourceNotAllowed => "source_not_allowed",
        }
    }

    /// True when the deny points at our own misconfiguration.
    pub fn is_operational(&self) -> bool {
        matches!(self, DenyReason::KeyUnavailable)
    }

    /// Fault class for log and alert routing.
    pub fn fault(&self) -> &'static str {
        if self.is_operational() {
            "operational"
        } else {
            "client"
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::MissingHeader(name) => write!(f, "missing_header({name})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Proof that a request passed full signature verification.
///
/// The private field keeps construction inside this crate's verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub(super) timestamp: i64,
}

impl Authorized {
    /// The verified signing timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[cfg(test)]
    pub(crate) fn for_test(timestamp: i64) -> Self {
        Self { timestamp }
    }
}

/// Outcome of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed(Authorized),
    Denied(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed(_))
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Verdict::Allowed(_) => None,
            Verdict::Denied(reason) => Some(reason),
        }
    }
}

/// Everything needed to verify one webhook delivery.
///
/// `raw_body` holds the bytes exactly as received. Re-serializing the JSON
/// changes the byte stream and breaks the signature.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub raw_body: Bytes,
    pub signature: String,
    pub timestamp: String,
}

impl VerificationRequest {
    pub fn new(raw_body: impl Into<Bytes>, signature: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            raw_body: raw_body.into(),
            signature: signature.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Build a request from HTTP headers and the untouched body.
    ///
    /// An absent, empty or non-ASCII header value is reported as missing.
    pub fn from_headers(headers: &HeaderMap, raw_body: Bytes, names: &HeaderNames) -> Result<Self, DenyReason> {
        let signature = header_value(headers, &names.signature)?;
        let timestamp = header_value(headers, &names.timestamp)?;

        Ok(Self {
            raw_body,
            signature: signature.to_string(),
            timestamp: timestamp.to_string(),
        })
    }
}

/// Fetch a required, non-empty header value.
pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, DenyReason> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DenyReason::MissingHeader(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_from_headers_present() {
        let map = headers(&[("telnyx-signature-ed25519", "c2ln"), ("telnyx-timestamp", "1753440891")]);
        let req = VerificationRequest::from_headers(&map, Bytes::from_static(b"{}"), &HeaderNames::default()).unwrap();

        assert_eq!(req.signature, "c2ln");
        assert_eq!(req.timestamp, "1753440891");
        assert_eq!(&req.raw_body[..], b"{}");
    }

    #[test]
    fn test_from_headers_missing_signature() {
        let map = headers(&[("telnyx-timestamp", "1753440891")]);
        let err = VerificationRequest::from_headers(&map, Bytes::new(), &HeaderNames::default()).unwrap_err();

        assert_eq!(err, DenyReason::MissingHeader("telnyx-signature-ed25519".to_string()));
    }

    #[test]
    fn test_from_headers_empty_value_is_missing() {
        let map = headers(&[("telnyx-signature-ed25519", "c2ln"), ("telnyx-timestamp", "")]);
        let err = VerificationRequest::from_headers(&map, Bytes::new(), &HeaderNames::default()).unwrap_err();

        assert_eq!(err, DenyReason::MissingHeader("telnyx-timestamp".to_string()));
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let names = HeaderNames::new("X-Signature-Ed25519", "X-Signature-Timestamp");
        let map = headers(&[("x-signature-ed25519", "c2ln"), ("x-signature-timestamp", "1")]);

        assert!(VerificationRequest::from_headers(&map, Bytes::new(), &names).is_ok());
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("BASE64".parse::<SignatureEncoding>().unwrap(), SignatureEncoding::Base64);
        assert_eq!("hex".parse::<SignatureEncoding>().unwrap(), SignatureEncoding::Hex);
        assert!("rot13".parse::<SignatureEncoding>().is_err());
    }

    #[test]
    fn test_only_key_unavailable_is_operational() {
        assert!(DenyReason::KeyUnavailable.is_operational());
        assert_eq!(DenyReason::KeyUnavailable.fault(), "operational");
        assert!(!DenyReason::BadSignature.is_operational());
        assert_eq!(DenyReason::TimestampOutOfWindow.fault(), "client");
    }
}
