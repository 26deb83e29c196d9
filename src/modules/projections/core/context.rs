use crate::modules::projections::core::transaction::{EventEnvelope, Transaction};
use crate::shared::core::primitives::{Checkpoint, Headers};
use crate::shared::infrastructure::store::StoreTransaction;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Everything a mapping can know about the event it is projecting, including
/// the storage transaction of the running batch.
#[derive(Clone)]
pub struct ProjectionContext {
    pub transaction_id: String,
    pub stream_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub checkpoint: Checkpoint,
    pub event_headers: Headers,
    pub transaction_headers: Headers,
    pub session: Arc<dyn StoreTransaction>,
}

impl ProjectionContext {
    pub fn for_event(
        transaction: &Transaction,
        envelope: &EventEnvelope,
        session: Arc<dyn StoreTransaction>,
    ) -> Self {
        Self {
            transaction_id: transaction.id.clone(),
            stream_id: transaction.stream_id.clone(),
            timestamp_utc: transaction.timestamp_utc,
            checkpoint: transaction.checkpoint,
            event_headers: envelope.headers.clone(),
            transaction_headers: transaction.headers.clone(),
            session,
        }
    }
}

impl fmt::Debug for ProjectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionContext")
            .field("transaction_id", &self.transaction_id)
            .field("stream_id", &self.stream_id)
            .field("timestamp_utc", &self.timestamp_utc)
            .field("checkpoint", &self.checkpoint)
            .field("event_headers", &self.event_headers)
            .field("transaction_headers", &self.transaction_headers)
            .finish_non_exhaustive()
    }
}
