//! Configuration module for environment variable parsing.
//!
//! Every setting has a default, so loading never fails. Values that do not
//! parse are logged and replaced by their default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use tracing::warn;

use crate::verify::{HeaderNames, SignatureEncoding};

/// Telnyx webhook source ranges.
pub const DEFAULT_SOURCE_CIDRS: &[&str] = &[
    "185.86.151.0/24",
    "185.86.150.0/24",
    "147.75.0.0/16",
    "139.178.0.0/16",
    "136.144.0.0/16",
];

/// Where the trusted public key is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    /// Environment variable derived from the logical secret name
    Env,
    /// One file per secret under `SECRETS_DIR`
    File,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Deployment environment, copied into stored records
    pub environment: String,

    // =========================================================================
    // Signature Verification
    // =========================================================================

    /// Header carrying the Ed25519 signature
    pub signature_header: String,

    /// Header carrying the signing timestamp
    pub timestamp_header: String,

    /// Encoding of the signature header value
    pub signature_encoding: SignatureEncoding,

    /// Logical name of the trusted public key in the secret store
    pub public_key_secret: String,

    /// Encoding of the stored public key
    pub public_key_encoding: SignatureEncoding,

    /// Maximum distance in seconds between the signed timestamp and now
    pub signature_tolerance_secs: u64,

    // =========================================================================
    // Secret Store
    // =========================================================================

    /// Secret store backend
    pub secret_store: SecretBackend,

    /// Directory for the file secret store
    pub secrets_dir: PathBuf,

    /// Upper bound on a single secret store call in milliseconds
    pub secret_fetch_timeout_ms: u64,

    /// Optional refresh interval for the cached public key
    pub public_key_cache_ttl_secs: Option<u64>,

    // =========================================================================
    // Early Gate
    // =========================================================================

    /// Coarse timestamp skew accepted before the body is read
    pub prefilter_max_skew_secs: u64,

    /// Source networks the webhook sender delivers from
    pub allowed_source_cidrs: Vec<IpNet>,

    /// Reject (rather than only log) requests from outside the allow-list
    pub enforce_source_ip: bool,

    /// Use the last `X-Forwarded-For` hop as the source address. Only enable
    /// behind a proxy that appends the peer address.
    pub trust_forwarded_for: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let signature_tolerance_secs = parse_or("TELNYX_SIGNATURE_TOLERANCE", 300);

        Config {
            port: parse_or("PORT", 8080),

            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()),

            signature_header: env::var("TELNYX_SIGNATURE_HEADER")
                .unwrap_or_else(|_| "telnyx-signature-ed25519".to_string()),

            timestamp_header: env::var("TELNYX_TIMESTAMP_HEADER")
                .unwrap_or_else(|_| "telnyx-timestamp".to_string()),

            signature_encoding: parse_or("TELNYX_SIGNATURE_ENCODING", SignatureEncoding::Base64),

            public_key_secret: env::var("TELNYX_PUBLIC_KEY_SECRET")
                .unwrap_or_else(|_| "smsbot/dev/telnyx-public-key".to_string()),

            public_key_encoding: parse_or("TELNYX_PUBLIC_KEY_ENCODING", SignatureEncoding::Base64),

            signature_tolerance_secs,

            secret_store: match env::var("SECRET_STORE").as_deref() {
                Ok("file") => SecretBackend::File,
                Ok("env") | Err(_) => SecretBackend::Env,
                Ok(other) => {
                    warn!(env_var = "SECRET_STORE", value = %other, "Unknown secret store, using env");
                    SecretBackend::Env
                }
            },

            secrets_dir: env::var("SECRETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/run/secrets")),

            secret_fetch_timeout_ms: match parse_or("SECRET_FETCH_TIMEOUT_MS", 2000) {
                0 => {
                    warn!(env_var = "SECRET_FETCH_TIMEOUT_MS", "Zero timeout, using default");
                    2000
                }
                ms => ms,
            },

            public_key_cache_ttl_secs: env::var("PUBLIC_KEY_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),

            prefilter_max_skew_secs: prefilter_skew(parse_or("PREFILTER_MAX_SKEW", 3600), signature_tolerance_secs),

            allowed_source_cidrs: parse_cidrs("TELNYX_SOURCE_CIDRS"),

            enforce_source_ip: parse_bool("ENFORCE_SOURCE_IP", false),

            trust_forwarded_for: parse_bool("TRUST_FORWARDED_FOR", false),
        }
    }

    /// Header names shared by the early gate and the verifier.
    pub fn header_names(&self) -> HeaderNames {
        HeaderNames::new(&self.signature_header, &self.timestamp_header)
    }

    pub fn secret_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.secret_fetch_timeout_ms)
    }

    pub fn public_key_cache_ttl(&self) -> Option<Duration> {
        self.public_key_cache_ttl_secs.map(Duration::from_secs)
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!(env_var = name, value = %raw, "Invalid boolean, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// The early gate must never be stricter than the signature window.
fn prefilter_skew(skew_secs: u64, tolerance_secs: u64) -> u64 {
    if skew_secs < tolerance_secs {
        warn!(
            env_var = "PREFILTER_MAX_SKEW",
            value = skew_secs,
            tolerance_secs,
            "Pre-filter skew below signature tolerance, raising it"
        );
        return tolerance_secs;
    }
    skew_secs
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Parse a comma-separated CIDR list, dropping invalid entries.
fn parse_cidrs(name: &str) -> Vec<IpNet> {
    let entries = parse_csv(name)
        .unwrap_or_else(|| DEFAULT_SOURCE_CIDRS.iter().map(|s| s.to_string()).collect());

    entries
        .iter()
        .filter_map(|entry| match entry.parse::<IpNet>() {
            Ok(net) => Some(net),
            Err(_) => {
                warn!(env_var = name, value = %entry, "Invalid CIDR, skipping");
                None
            }
        })
        .collect()
}
