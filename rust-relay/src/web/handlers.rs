//! Webhook endpoint handlers.
//!
//! The handlers are the only place the byte-exact body is available, so they
//! make the authoritative decision:
//! 1. Verify the Ed25519 signature over `timestamp|body`
//! 2. Parse and process the event
//! 3. Hand the resulting records to the sink

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::events::{process_event, Delivery, EventAction, EventContext, EventSink};
use crate::verify::{PreFilterPolicy, PreFiltered, Verdict, VerificationRequest, WebhookVerifier};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: WebhookVerifier,
    pub prefilter: Arc<PreFilterPolicy>,
    pub sink: Arc<dyn EventSink>,
}

impl AppState {
    pub fn new(config: Config, verifier: WebhookVerifier, sink: Arc<dyn EventSink>) -> Self {
        let prefilter = PreFilterPolicy::from_config(&config);
        Self {
            config: Arc::new(config),
            verifier,
            prefilter: Arc::new(prefilter),
            sink,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Telnyx Webhooks
// =============================================================================

/// Webhook response.
///
/// Denials carry no reason so callers learn nothing about which check failed.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<EventAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl WebhookResponse {
    pub fn status(status: &'static str) -> Self {
        Self {
            status,
            event_type: None,
            action: None,
            message_id: None,
        }
    }
}

/// Generic authentication failure.
pub fn unauthorized() -> (StatusCode, Json<WebhookResponse>) {
    (StatusCode::UNAUTHORIZED, Json(WebhookResponse::status("unauthorized")))
}

/// Primary Telnyx webhook endpoint.
pub async fn telnyx_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    prefiltered: Option<Extension<PreFiltered>>,
    body: Bytes,
) -> impl IntoResponse {
    handle_delivery(&state, &headers, prefiltered, body, Delivery::Primary).await
}

/// Failover endpoint Telnyx uses when the primary URL keeps failing.
///
/// Deliveries here are verified exactly like primary ones.
pub async fn telnyx_failover_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    prefiltered: Option<Extension<PreFiltered>>,
    body: Bytes,
) -> impl IntoResponse {
    handle_delivery(&state, &headers, prefiltered, body, Delivery::Failover).await
}

async fn handle_delivery(
    state: &AppState,
    headers: &HeaderMap,
    prefiltered: Option<Extension<PreFiltered>>,
    body: Bytes,
    delivery: Delivery,
) -> (StatusCode, Json<WebhookResponse>) {
    info!(
        delivery = ?delivery,
        body_length = body.len(),
        prefiltered = prefiltered.is_some(),
        source_allowed = ?prefiltered.as_ref().map(|p| p.source_allowed),
        "webhook_received"
    );

    let names = state.config.header_names();
    let request = match VerificationRequest::from_headers(headers, body, &names) {
        Ok(request) => request,
        Err(reason) => {
            warn!(deny_reason = reason.as_str(), fault = reason.fault(), header = %reason, "signature_denied");
            return unauthorized();
        }
    };

    let authorized = match state.verifier.verify(&request).await {
        Verdict::Allowed(authorized) => authorized,
        Verdict::Denied(_) => return unauthorized(),
    };

    let ctx = EventContext {
        environment: state.config.environment.clone(),
        delivery,
        now: state.verifier.now(),
    };

    let event = match process_event(&authorized, &request.raw_body, &ctx) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "webhook_payload_invalid");
            return (StatusCode::BAD_REQUEST, Json(WebhookResponse::status("invalid_payload")));
        }
    };

    if !event.records.is_empty() {
        if let Err(e) = state.sink.record(&event.records).await {
            error!(
                error = %e,
                event_type = %event.event_type,
                record_count = event.records.len(),
                "sink_record_failed"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(WebhookResponse::status("error")));
        }
    }

    let status = if event.action == EventAction::Ignored {
        "ignored"
    } else {
        "processed"
    };

    (
        StatusCode::OK,
        Json(WebhookResponse {
            status,
            event_type: Some(event.event_type),
            action: Some(event.action),
            message_id: event.message_id,
        }),
    )
}
