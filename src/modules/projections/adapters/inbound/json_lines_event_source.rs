// Transactions read from a JSON lines file.
//
// Purpose
// - Feed a projector from an exported event log, one transaction per line.
//
// Responsibilities
// - Translate event tags into typed events through a registry.
// - Report malformed lines and unknown tags with their line number.
// - Deliver transactions after a checkpoint in pages, stopping when cancelled.

use crate::modules::projections::core::errors::ProjectorError;
use crate::modules::projections::core::transaction::{Event, EventEnvelope, Transaction};
use crate::modules::projections::use_cases::project_transactions::handler::TransactionHandler;
use crate::shared::core::primitives::{Checkpoint, Headers};
use crate::shared::infrastructure::cancellation::CancellationToken;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read the event log: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line} is not a valid transaction: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} contains unknown event type {event_type}")]
    UnknownEventType { line: usize, event_type: String },

    #[error(transparent)]
    Projector(#[from] ProjectorError),
}

type Decoder = Arc<dyn Fn(Value) -> Result<EventEnvelope, serde_json::Error> + Send + Sync>;

/// Maps event tags to the typed events they deserialize into.
#[derive(Clone, Default)]
pub struct EventTypeRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Event + DeserializeOwned>(mut self) -> Self {
        let decoder: Decoder =
            Arc::new(|body: Value| serde_json::from_value::<E>(body).map(EventEnvelope::new));
        self.decoders.insert(E::EVENT_TYPE, decoder);
        self
    }

    pub fn knows(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    fn decode(&self, line: usize, record: EventRecord) -> Result<EventEnvelope, SourceError> {
        let decoder =
            self.decoders
                .get(record.event_type.as_str())
                .ok_or_else(|| SourceError::UnknownEventType {
                    line,
                    event_type: record.event_type.clone(),
                })?;
        let mut envelope =
            decoder(record.body).map_err(|source| SourceError::Malformed { line, source })?;
        envelope.headers = record.headers;
        Ok(envelope)
    }
}

#[derive(Deserialize)]
struct TransactionRecord {
    #[serde(default = "new_transaction_id")]
    id: String,
    stream_id: String,
    timestamp_utc: DateTime<Utc>,
    checkpoint: Checkpoint,
    events: Vec<EventRecord>,
    #[serde(default)]
    headers: Headers,
}

#[derive(Deserialize)]
struct EventRecord {
    #[serde(rename = "type")]
    event_type: String,
    body: Value,
    #[serde(default)]
    headers: Headers,
}

fn new_transaction_id() -> String {
    Uuid::now_v7().to_string()
}

pub struct JsonLinesEventSource {
    path: PathBuf,
    registry: EventTypeRegistry,
    page_size: usize,
}

impl JsonLinesEventSource {
    pub fn new(path: impl Into<PathBuf>, registry: EventTypeRegistry) -> Self {
        Self {
            path: path.into(),
            registry,
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Parses one line of the log. Line numbers start at 1.
    pub fn parse_line(&self, line: usize, text: &str) -> Result<Transaction, SourceError> {
        let record: TransactionRecord =
            serde_json::from_str(text).map_err(|source| SourceError::Malformed { line, source })?;
        let events = record
            .events
            .into_iter()
            .map(|event| self.registry.decode(line, event))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Transaction {
            id: record.id,
            stream_id: record.stream_id,
            timestamp_utc: record.timestamp_utc,
            checkpoint: record.checkpoint,
            events,
            headers: record.headers,
        })
    }

    /// Reads the whole log, skipping blank lines.
    pub async fn load(&self) -> Result<Vec<Transaction>, SourceError> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut transactions = Vec::new();
        let mut line = 0;
        while let Some(text) = lines.next_line().await? {
            line += 1;
            if text.trim().is_empty() {
                continue;
            }
            transactions.push(self.parse_line(line, &text)?);
        }
        debug!(path = %self.path.display(), transactions = transactions.len(), "loaded event log");
        Ok(transactions)
    }

    /// Hands every transaction after `last_checkpoint` to `handler`, one page
    /// at a time. Returns the checkpoint of the last delivered transaction.
    pub async fn deliver(
        &self,
        last_checkpoint: Option<Checkpoint>,
        handler: &dyn TransactionHandler,
        cancellation: &CancellationToken,
    ) -> Result<Option<Checkpoint>, SourceError> {
        let pending: Vec<Transaction> = self
            .load()
            .await?
            .into_iter()
            .filter(|t| last_checkpoint.is_none_or(|checkpoint| t.checkpoint > checkpoint))
            .collect();

        let mut delivered = last_checkpoint;
        for page in pending.chunks(self.page_size) {
            if cancellation.is_cancelled() {
                info!(path = %self.path.display(), "delivery cancelled");
                break;
            }
            handler.handle(page, cancellation).await?;
            delivered = page.last().map(|t| t.checkpoint).or(delivered);
        }
        Ok(delivered)
    }
}
