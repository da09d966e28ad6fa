//! Processing of verified Telnyx messaging events.
//!
//! Every entry point takes an [`Authorized`] token, so a payload can only be
//! parsed after its signature has been verified.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::types::{
    AnalyticsRecord, ConversationRecord, Delivery, EventAction, EventData, ProcessedEvent, SinkRecord, StatusRecord,
    TelnyxWebhook,
};
use crate::verify::Authorized;

/// Errors raised while interpreting a verified body.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Request-scoped values copied into stored records.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub environment: String,
    pub delivery: Delivery,
    /// Seconds since the Unix epoch
    pub now: i64,
}

impl EventContext {
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.now, 0).unwrap_or_default()
    }
}

/// Parse a verified raw body and route it by event type.
pub fn process_event(_authorized: &Authorized, raw_body: &[u8], ctx: &EventContext) -> Result<ProcessedEvent, EventError> {
    let webhook: TelnyxWebhook = serde_json::from_slice(raw_body)?;
    let data = webhook.data;

    info!(
        event_type = %data.event_type,
        event_id = ?data.id,
        occurred_at = ?data.occurred_at,
        delivery = ?ctx.delivery,
        "webhook_event_routing"
    );

    let event = match data.event_type.as_str() {
        "message.received" => message_received(data, ctx),
        "message.sent" => status_change(data, ctx, EventAction::SentConfirmation),
        "message.finalized" | "message.delivered" => status_change(data, ctx, EventAction::DeliveryConfirmation),
        "message.failed" => status_change(data, ctx, EventAction::FailureNotification),
        _ => {
            warn!(event_type = %data.event_type, "webhook_event_unhandled");
            ProcessedEvent {
                event_type: data.event_type,
                action: EventAction::Ignored,
                message_id: None,
                records: Vec::new(),
            }
        }
    };

    info!(
        event_type = %event.event_type,
        action = ?event.action,
        message_id = ?event.message_id,
        record_count = event.records.len(),
        "webhook_event_processed"
    );

    Ok(event)
}

/// Inbound SMS: upsert the conversation and count the message.
fn message_received(data: EventData, ctx: &EventContext) -> ProcessedEvent {
    let payload = data.payload;
    let phone_number = payload
        .from
        .map(|f| f.phone_number)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let now = ctx.now_utc();

    info!(
        phone_number = %phone_number,
        message_id = %payload.id,
        message_length = payload.text.chars().count(),
        "sms_received"
    );

    let conversation = ConversationRecord {
        phone_number: phone_number.clone(),
        last_message: payload.text.clone(),
        last_message_id: payload.id.clone(),
        conversation_state: "active".to_string(),
        message_count: 1,
        environment: ctx.environment.clone(),
        delivery: ctx.delivery,
        created_at: now,
        updated_at: now,
    };

    let analytics = AnalyticsRecord {
        date: now.format("%Y-%m-%d").to_string(),
        metric_type: "message_received".to_string(),
        phone_number,
        message_length: payload.text.chars().count(),
        environment: ctx.environment.clone(),
        timestamp: now,
    };

    ProcessedEvent {
        event_type: data.event_type,
        action: EventAction::MessageStored,
        message_id: Some(payload.id),
        records: vec![SinkRecord::Conversation(conversation), SinkRecord::Analytics(analytics)],
    }
}

/// Outbound message lifecycle notifications.
fn status_change(data: EventData, ctx: &EventContext, action: EventAction) -> ProcessedEvent {
    let payload = data.payload;

    if action == EventAction::FailureNotification {
        warn!(
            message_id = %payload.id,
            error_count = payload.errors.len(),
            errors = %serde_json::Value::Array(payload.errors.clone()),
            "sms_delivery_failed"
        );
    }

    let status = StatusRecord {
        message_id: payload.id.clone(),
        event_type: data.event_type.clone(),
        errors: payload.errors,
        delivery: ctx.delivery,
        timestamp: ctx.now_utc(),
    };

    ProcessedEvent {
        event_type: data.event_type,
        action,
        message_id: Some(payload.id),
        records: vec![SinkRecord::Status(status)],
    }
}
