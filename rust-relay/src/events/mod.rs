//! Verified event processing.
//!
//! ## Processing Flow
//!
//! ```text
//! Authorized + raw body → process_event() → ProcessedEvent → EventSink
//! ```

pub mod sink;
pub mod telnyx;
pub mod types;

pub use sink::{EventSink, LoggingSink, MemorySink, SinkError};
pub use telnyx::{process_event, EventContext, EventError};
pub use types::{
    AnalyticsRecord, ConversationRecord, Delivery, EventAction, ProcessedEvent, SinkRecord, StatusRecord,
    TelnyxWebhook,
};
