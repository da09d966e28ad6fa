//! Downstream persistence/acknowledgment sink.
//!
//! Records reach a sink only after the delivery verified and parsed. All
//! records produced by one event arrive in a single call. Telnyx retries a
//! delivery that was not acknowledged, so sinks must tolerate seeing the same
//! batch more than once.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use super::types::SinkRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives records produced from verified events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Store one event's records. Either all of them are stored or none are.
    async fn record(&self, records: &[SinkRecord]) -> Result<(), SinkError>;
}

/// Writes each record as a structured log line.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink;

#[async_trait]
impl EventSink for LoggingSink {
    async fn record(&self, records: &[SinkRecord]) -> Result<(), SinkError> {
        let lines = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        for json in lines {
            info!(record = %json, "sink_record");
        }
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<SinkRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub async fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn record(&self, records: &[SinkRecord]) -> Result<(), SinkError> {
        self.records.lock().await.extend_from_slice(records);
        Ok(())
    }
}
