use crate::modules::projections::core::transaction::{EventEnvelope, Transaction};
use crate::shared::infrastructure::store::StoreError;
use std::error::Error as StdError;
use thiserror::Error;

type Cause = Box<dyn StdError + Send + Sync + 'static>;

pub(crate) const EVENT_FAILED: &str = "Projector failed to project an event.";
pub(crate) const BATCH_FAILED: &str = "Projector failed to project transaction batch.";
pub(crate) const CHECKPOINT_FAILED: &str = "Projector failed to store last checkpoint.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionErrorKind {
    DuplicateProjection,
    MissingProjection,
    Handler,
    Storage,
    Checkpoint,
}

/// A failure while projecting a batch. As it travels up it is enriched with
/// the failing event, its transaction, the projector and the whole batch, so
/// an exception policy can decide what to do with full context.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProjectionError {
    kind: ProjectionErrorKind,
    message: String,
    #[source]
    cause: Option<Cause>,
    projector: Option<String>,
    transaction_id: Option<String>,
    current_event: Option<EventEnvelope>,
    transaction_batch: Vec<Transaction>,
}

impl ProjectionError {
    fn new(kind: ProjectionErrorKind, message: impl Into<String>, cause: Option<Cause>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause,
            projector: None,
            transaction_id: None,
            current_event: None,
            transaction_batch: Vec::new(),
        }
    }

    pub fn duplicate_projection(message: impl Into<String>) -> Self {
        Self::new(ProjectionErrorKind::DuplicateProjection, message, None)
    }

    pub fn missing_projection(message: impl Into<String>) -> Self {
        Self::new(ProjectionErrorKind::MissingProjection, message, None)
    }

    /// Wraps a failure raised by user code. A `ProjectionError` raised on
    /// purpose by that code is passed through untouched.
    pub fn handler(message: impl Into<String>, cause: anyhow::Error) -> Self {
        match cause.downcast::<ProjectionError>() {
            Ok(error) => error,
            Err(cause) => Self::new(ProjectionErrorKind::Handler, message, Some(cause.into())),
        }
    }

    pub fn storage(message: impl Into<String>, cause: StoreError) -> Self {
        Self::new(ProjectionErrorKind::Storage, message, Some(Box::new(cause)))
    }

    pub fn checkpoint(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self::new(ProjectionErrorKind::Checkpoint, message, Some(cause.into()))
    }

    pub fn kind(&self) -> ProjectionErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn projector(&self) -> Option<&str> {
        self.projector.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn current_event(&self) -> Option<&EventEnvelope> {
        self.current_event.as_ref()
    }

    pub fn transaction_batch(&self) -> &[Transaction] {
        &self.transaction_batch
    }

    pub(crate) fn at_event(mut self, transaction_id: &str, envelope: &EventEnvelope) -> Self {
        self.transaction_id = Some(transaction_id.to_string());
        self.current_event = Some(envelope.clone());
        self
    }

    pub(crate) fn in_batch(mut self, projector: &str, batch: &[Transaction]) -> Self {
        self.projector = Some(projector.to_string());
        self.transaction_batch = batch.to_vec();
        self
    }
}

/// Terminal outcome of [`crate::modules::projections::use_cases::project_transactions::handler::Projector::handle`].
#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("already retrying individual transactions")]
    NestedIndividualRetry(#[source] ProjectionError),

    #[error("cancelled while the exception policy was running")]
    Cancelled,

    #[error("failed to read the projector state: {0}")]
    State(#[source] StoreError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch size must be at least 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("state key is missing")]
    MissingStateKey,

    #[error("cache capacity must be at least 1")]
    InvalidCapacity,

    #[error("minimum retention must not exceed maximum retention")]
    InvalidRetention,

    #[error("invalid value for {name}: {value}")]
    InvalidEnvironment { name: String, value: String },
}
