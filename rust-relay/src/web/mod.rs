//! Web server module for handling inbound webhooks.
//!
//! Webhook routes pass through two placements:
//! - [`gate::early_gate`]: header-only pre-filter, may reject, never authorizes
//! - [`handlers`]: holds the raw body, verifies the signature, processes the event

pub mod gate;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use gate::early_gate;
pub use handlers::{
    health, telnyx_failover_webhook, telnyx_webhook, unauthorized, AppState, HealthResponse, WebhookResponse,
};

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let webhooks = Router::new()
        .route("/webhooks/telnyx", post(telnyx_webhook))
        .route("/webhooks/telnyx/failover", post(telnyx_failover_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), early_gate));

    Router::new()
        .route("/health", get(health))
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
