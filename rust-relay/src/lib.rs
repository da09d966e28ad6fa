//! SMS Bot Relay - Telnyx webhook receiver with Ed25519 signature verification.
//!
//! This library backs the `smsbot-relay` binary:
//! - `verify`: signature verification and the header-only early gate
//! - `keys`: trusted public key retrieval and caching
//! - `events`: processing of verified messaging events
//! - `web`: axum routes wiring the above together
//!
//! ## Architecture
//!
//! ```text
//! Telnyx → early gate (headers) → handler (raw body, verify) → events → sink
//! ```

pub mod clock;
pub mod config;
pub mod events;
pub mod keys;
pub mod verify;
pub mod web;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use events::{process_event, EventSink, LoggingSink, MemorySink};
pub use keys::{key_cache_from_config, KeyCache, SecretStore, TrustedKey};
pub use verify::{DenyReason, Verdict, VerificationRequest, WebhookVerifier};
pub use web::{create_router, AppState};
