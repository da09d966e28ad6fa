//! Early gate middleware.
//!
//! Runs in front of the webhook handlers and sees headers and connection info
//! only. It can turn requests away, but a request it lets through is still
//! unverified: the handler decides.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::handlers::{unauthorized, AppState};
use crate::verify::PreFilterOutcome;

/// Header-only pre-filter for webhook routes.
pub async fn early_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let source_ip = source_ip(&request, state.config.trust_forwarded_for);

    match state.prefilter.prefilter(request.headers(), source_ip, state.verifier.now()) {
        PreFilterOutcome::Passed(prefiltered) => {
            if !prefiltered.source_allowed {
                warn!(source_ip = ?source_ip, "early_gate_unknown_source");
            }
            debug!(
                source_ip = ?source_ip,
                claimed_timestamp = prefiltered.claimed_timestamp,
                "early_gate_passed"
            );
            request.extensions_mut().insert(prefiltered);
            next.run(request).await
        }
        PreFilterOutcome::Rejected(reason) => {
            warn!(
                source_ip = ?source_ip,
                deny_reason = reason.as_str(),
                fault = reason.fault(),
                "early_gate_rejected"
            );
            unauthorized().into_response()
        }
    }
}

/// Client address: last `X-Forwarded-For` hop when trusted, else the peer.
///
/// The last hop is the one appended by the proxy in front of us. Earlier hops
/// are supplied by the client.
fn source_ip(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|last| last.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
