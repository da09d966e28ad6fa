//! Coarse header-only checks for the early gate.
//!
//! The early gate runs before the body is read, so it cannot verify a
//! signature. It can only reject obviously bad requests. A pass here is
//! never an authorization: [`PreFiltered`] cannot be turned into
//! [`super::Authorized`].

use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnet::IpNet;

use super::types::{header_value, DenyReason, HeaderNames};
use super::window::{parse_timestamp, TimestampWindow};
use crate::config::Config;

/// Non-authoritative pass from the early gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreFiltered {
    /// Claimed (unverified) signing timestamp
    pub claimed_timestamp: i64,
    /// Source address, when known
    pub source_ip: Option<IpAddr>,
    /// Source address matched the allow-list
    pub source_allowed: bool,
}

/// Early gate outcome. It has no "allowed" variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreFilterOutcome {
    Passed(PreFiltered),
    Rejected(DenyReason),
}

/// What the early gate checks.
#[derive(Debug, Clone)]
pub struct PreFilterPolicy {
    pub headers: HeaderNames,
    /// Wide timestamp window; the authoritative window is applied later
    pub max_skew: TimestampWindow,
    /// Networks deliveries are expected from; empty disables the check
    pub allowed_sources: Vec<IpNet>,
    /// Reject sources outside `allowed_sources` instead of flagging them
    pub enforce_source: bool,
}

impl PreFilterPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headers: config.header_names(),
            max_skew: TimestampWindow::new(config.prefilter_max_skew_secs.max(config.signature_tolerance_secs)),
            allowed_sources: config.allowed_source_cidrs.clone(),
            enforce_source: config.enforce_source_ip,
        }
    }

    fn source_allowed(&self, source_ip: Option<IpAddr>) -> bool {
        if self.allowed_sources.is_empty() {
            return true;
        }
        match source_ip {
            Some(ip) => self.allowed_sources.iter().any(|net| net.contains(&ip)),
            None => false,
        }
    }

    /// Apply the header-only checks.
    pub fn prefilter(&self, headers: &HeaderMap, source_ip: Option<IpAddr>, now: i64) -> PreFilterOutcome {
        match self.check(headers, source_ip, now) {
            Ok(passed) => PreFilterOutcome::Passed(passed),
            Err(reason) => PreFilterOutcome::Rejected(reason),
        }
    }

    fn check(&self, headers: &HeaderMap, source_ip: Option<IpAddr>, now: i64) -> Result<PreFiltered, DenyReason> {
        header_value(headers, &self.headers.signature)?;
        let timestamp = header_value(headers, &self.headers.timestamp)?;

        let claimed_timestamp = parse_timestamp(timestamp)?;
        self.max_skew.check(claimed_timestamp, now)?;

        let source_allowed = self.source_allowed(source_ip);
        if !source_allowed && self.enforce_source {
            return Err(DenyReason::SourceNotAllowed);
        }

        Ok(PreFiltered {
            claimed_timestamp,
            source_ip,
            source_allowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const NOW: i64 = 1753440891;

    fn policy(enforce_source: bool) -> PreFilterPolicy {
        PreFilterPolicy {
            headers: HeaderNames::default(),
            max_skew: TimestampWindow::new(3600),
            allowed_sources: vec!["185.86.151.0/24".parse().unwrap()],
            enforce_source,
        }
    }

    fn headers(signature: Option<&str>, timestamp: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(sig) = signature {
            map.insert("telnyx-signature-ed25519", HeaderValue::from_str(sig).unwrap());
        }
        if let Some(ts) = timestamp {
            map.insert("telnyx-timestamp", HeaderValue::from_str(ts).unwrap());
        }
        map
    }

    fn telnyx_ip() -> Option<IpAddr> {
        Some("185.86.151.11".parse().unwrap())
    }

    #[test]
    fn test_passes_with_headers() {
        let outcome = policy(false).prefilter(&headers(Some("garbage"), Some("1753440891")), telnyx_ip(), NOW);

        match outcome {
            PreFilterOutcome::Passed(p) => {
                assert_eq!(p.claimed_timestamp, NOW);
                assert!(p.source_allowed);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_missing_headers_rejected() {
        let p = policy(false);

        assert_eq!(
            p.prefilter(&headers(None, Some("1753440891")), telnyx_ip(), NOW),
            PreFilterOutcome::Rejected(DenyReason::MissingHeader("telnyx-signature-ed25519".to_string()))
        );
        assert_eq!(
            p.prefilter(&headers(Some("sig"), None), telnyx_ip(), NOW),
            PreFilterOutcome::Rejected(DenyReason::MissingHeader("telnyx-timestamp".to_string()))
        );
    }

    #[test]
    fn test_coarse_timestamp_checks() {
        let p = policy(false);

        assert_eq!(
            p.prefilter(&headers(Some("sig"), Some("soon")), telnyx_ip(), NOW),
            PreFilterOutcome::Rejected(DenyReason::MalformedTimestamp)
        );
        assert_eq!(
            p.prefilter(&headers(Some("sig"), Some("1753437290")), telnyx_ip(), NOW),
            PreFilterOutcome::Rejected(DenyReason::TimestampOutOfWindow)
        );
        assert_eq!(
            p.prefilter(&headers(Some("sig"), Some("1753444492")), telnyx_ip(), NOW),
            PreFilterOutcome::Rejected(DenyReason::TimestampOutOfWindow)
        );
        // Outside the authoritative window but inside the coarse one.
        assert!(matches!(
            p.prefilter(&headers(Some("sig"), Some("1753440000")), telnyx_ip(), NOW),
            PreFilterOutcome::Passed(_)
        ));
    }

    #[test]
    fn test_unknown_source_flagged_when_not_enforced() {
        let outcome = policy(false).prefilter(
            &headers(Some("sig"), Some("1753440891")),
            Some("203.0.113.9".parse().unwrap()),
            NOW,
        );

        match outcome {
            PreFilterOutcome::Passed(p) => assert!(!p.source_allowed),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_source_rejected_when_enforced() {
        let p = policy(true);
        let h = headers(Some("sig"), Some("1753440891"));

        assert_eq!(
            p.prefilter(&h, Some("203.0.113.9".parse().unwrap()), NOW),
            PreFilterOutcome::Rejected(DenyReason::SourceNotAllowed)
        );
        assert_eq!(p.prefilter(&h, None, NOW), PreFilterOutcome::Rejected(DenyReason::SourceNotAllowed));
        assert!(matches!(p.prefilter(&h, telnyx_ip(), NOW), PreFilterOutcome::Passed(_)));
    }

    #[test]
    fn test_coarse_window_not_narrower_than_tolerance() {
        let mut config = Config::from_env();
        config.signature_tolerance_secs = 300;
        config.prefilter_max_skew_secs = 60;

        let p = PreFilterPolicy::from_config(&config);

        assert_eq!(p.max_skew.tolerance_secs(), 300);
        // 120 seconds old: inside the signature window, so the gate lets it through.
        assert!(matches!(
            p.prefilter(&headers(Some("sig"), Some("1753440771")), telnyx_ip(), NOW),
            PreFilterOutcome::Passed(_)
        ));
    }

    #[test]
    fn test_empty_allow_list_accepts_any_source() {
        let mut p = policy(true);
        p.allowed_sources.clear();

        assert!(matches!(
            p.prefilter(&headers(Some("sig"), Some("1753440891")), None, NOW),
            PreFilterOutcome::Passed(_)
        ));
    }
}
