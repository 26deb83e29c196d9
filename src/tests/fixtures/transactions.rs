use crate::modules::projections::core::transaction::{Event, EventEnvelope, Transaction};
use crate::shared::core::primitives::{Checkpoint, Headers};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

pub struct TransactionBuilder {
    id: String,
    stream_id: String,
    timestamp_utc: DateTime<Utc>,
    checkpoint: Checkpoint,
    events: Vec<EventEnvelope>,
    headers: Headers,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            stream_id: "stream-1".to_string(),
            timestamp_utc: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            checkpoint: 1,
            events: Vec::new(),
            headers: Headers::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = stream_id.into();
        self
    }

    pub fn with_event<E: Event>(self, event: E) -> Self {
        self.with_envelope(EventEnvelope::new(event))
    }

    pub fn with_envelope(mut self, envelope: EventEnvelope) -> Self {
        self.events.push(envelope);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            id: self.id,
            stream_id: self.stream_id,
            timestamp_utc: self.timestamp_utc,
            checkpoint: self.checkpoint,
            events: self.events,
            headers: self.headers,
        }
    }
}
