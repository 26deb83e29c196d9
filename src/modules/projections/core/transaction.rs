use crate::shared::core::primitives::{Checkpoint, Headers};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A domain event that can travel through the projector. The tag is the key
/// the event map dispatches on and must be unique per event type.
pub trait Event: Any + Send + Sync {
    const EVENT_TYPE: &'static str;
}

/// An event body plus its headers. The body is type-erased and recovered by
/// downcasting to the concrete [`Event`].
#[derive(Clone)]
pub struct EventEnvelope {
    event_type: &'static str,
    body: Arc<dyn Any + Send + Sync>,
    pub headers: Headers,
}

impl EventEnvelope {
    pub fn new<E: Event>(body: E) -> Self {
        Self {
            event_type: E::EVENT_TYPE,
            body: Arc::new(body),
            headers: Headers::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    pub fn body<E: Event>(&self) -> Option<&E> {
        self.body.downcast_ref::<E>()
    }

    pub fn shared_body<E: Event>(&self) -> Option<Arc<E>> {
        self.body.clone().downcast::<E>().ok()
    }

    /// True when both envelopes carry the very same event instance.
    pub fn same_event(&self, other: &EventEnvelope) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.body), Arc::as_ptr(&other.body))
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("event_type", &self.event_type)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A committed group of events from one stream.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub stream_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub checkpoint: Checkpoint,
    pub events: Vec<EventEnvelope>,
    pub headers: Headers,
}
