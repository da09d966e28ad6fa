//! Telnyx webhook payload and record types.
//!
//! Only the fields the relay uses are modelled; everything else in the
//! envelope is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound Envelope
// =============================================================================

/// Top-level webhook body: `{"data": {...}, "meta": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TelnyxWebhook {
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub payload: MessagePayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: Option<PhoneEndpoint>,
    #[serde(default)]
    pub to: Vec<PhoneEndpoint>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneEndpoint {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub status: Option<String>,
}

// =============================================================================
// Processing Output
// =============================================================================

/// Which endpoint the delivery arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Primary,
    Failover,
}

/// What the relay did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    MessageStored,
    SentConfirmation,
    DeliveryConfirmation,
    FailureNotification,
    Ignored,
}

/// Result of processing one verified webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedEvent {
    pub event_type: String,
    pub action: EventAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip)]
    pub records: Vec<SinkRecord>,
}

/// Row per phone number with the latest inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub phone_number: String,
    pub last_message: String,
    pub last_message_id: String,
    pub conversation_state: String,
    /// Messages carried by this record; a sink merging rows adds these up
    pub message_count: u32,
    pub environment: String,
    pub delivery: Delivery,
    /// First time the conversation was seen; a sink merging rows keeps the oldest
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Daily metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    /// `YYYY-MM-DD`
    pub date: String,
    pub metric_type: String,
    pub phone_number: String,
    pub message_length: usize,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
}

/// Outbound message status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub message_id: String,
    pub event_type: String,
    pub errors: Vec<serde_json::Value>,
    pub delivery: Delivery,
    pub timestamp: DateTime<Utc>,
}

/// Anything handed to the downstream sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum SinkRecord {
    Conversation(ConversationRecord),
    Analytics(AnalyticsRecord),
    Status(StatusRecord),
}
