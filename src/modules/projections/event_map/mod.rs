// Declarative mapping from event types to projection operations.
//
// Purpose
// - Describe once, at startup, what each event does to a projection.
//
// Responsibilities
// - Dispatch an event to every mapping registered for its type, in registration order.
// - Translate create, update and delete mappings into calls on ProjectionOperations.
// - Run custom actions inside the storage transaction of the batch.
// - Report whether any mapping handled the event.

use crate::modules::projections::core::context::ProjectionContext;
use crate::modules::projections::core::errors::{EVENT_FAILED, ProjectionError};
use crate::modules::projections::core::projection::Projection;
use crate::modules::projections::core::transaction::{Event, EventEnvelope};
use crate::shared::core::primitives::BoxFuture;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod builder;

pub use builder::EventMapBuilder;

/// What a create does when the projection already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    #[default]
    Fail,
    Ignore,
    Overwrite,
}

/// What an update or delete does when the projection does not exist.
/// `Create` only applies to updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    #[default]
    Fail,
    Ignore,
    Create,
}

pub type Mutation<'a, P> =
    &'a (dyn Fn(&mut P, &ProjectionContext) -> anyhow::Result<()> + Send + Sync);

/// Storage-facing side of the map: how projections are created, updated and
/// deleted for a given key.
#[async_trait]
pub trait ProjectionOperations<P: Projection>: Send + Sync {
    async fn create<'a>(
        &'a self,
        key: P::Key,
        context: &'a ProjectionContext,
        mutation: Mutation<'a, P>,
        on_duplicate: DuplicatePolicy,
    ) -> Result<(), ProjectionError>;

    async fn update<'a>(
        &'a self,
        key: P::Key,
        context: &'a ProjectionContext,
        mutation: Mutation<'a, P>,
        on_missing: MissingPolicy,
    ) -> Result<(), ProjectionError>;

    async fn delete<'a>(
        &'a self,
        key: P::Key,
        context: &'a ProjectionContext,
        on_missing: MissingPolicy,
    ) -> Result<(), ProjectionError>;
}

type KeySelector<P, E> = Arc<dyn Fn(&E) -> <P as Projection>::Key + Send + Sync>;
type Condition<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type Mutator<P, E> = Arc<dyn Fn(&mut P, &E, &ProjectionContext) -> anyhow::Result<()> + Send + Sync>;
type CustomAction<E> =
    Arc<dyn Fn(Arc<E>, ProjectionContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

enum Action<P: Projection, E> {
    Create {
        key: KeySelector<P, E>,
        mutate: Mutator<P, E>,
        on_duplicate: DuplicatePolicy,
    },
    Update {
        key: KeySelector<P, E>,
        mutate: Mutator<P, E>,
        on_missing: MissingPolicy,
    },
    Delete {
        key: KeySelector<P, E>,
        on_missing: MissingPolicy,
    },
    Custom(CustomAction<E>),
}

struct Mapping<P: Projection, E> {
    condition: Option<Condition<E>>,
    action: Action<P, E>,
}

#[async_trait]
trait EventHandler<P: Projection>: Send + Sync {
    async fn handle(
        &self,
        envelope: &EventEnvelope,
        context: &ProjectionContext,
        operations: &dyn ProjectionOperations<P>,
    ) -> Result<bool, ProjectionError>;
}

#[async_trait]
impl<P: Projection, E: Event> EventHandler<P> for Mapping<P, E> {
    async fn handle(
        &self,
        envelope: &EventEnvelope,
        context: &ProjectionContext,
        operations: &dyn ProjectionOperations<P>,
    ) -> Result<bool, ProjectionError> {
        let Some(event) = envelope.shared_body::<E>() else {
            return Ok(false);
        };
        if let Some(condition) = &self.condition {
            if !condition(event.as_ref()) {
                return Ok(false);
            }
        }

        match &self.action {
            Action::Create {
                key,
                mutate,
                on_duplicate,
            } => {
                let mutation = |projection: &mut P, ctx: &ProjectionContext| {
                    mutate(projection, event.as_ref(), ctx)
                };
                operations
                    .create(key(event.as_ref()), context, &mutation, *on_duplicate)
                    .await?;
            }
            Action::Update {
                key,
                mutate,
                on_missing,
            } => {
                let mutation = |projection: &mut P, ctx: &ProjectionContext| {
                    mutate(projection, event.as_ref(), ctx)
                };
                operations
                    .update(key(event.as_ref()), context, &mutation, *on_missing)
                    .await?;
            }
            Action::Delete { key, on_missing } => {
                operations
                    .delete(key(event.as_ref()), context, *on_missing)
                    .await?;
            }
            Action::Custom(action) => {
                action(event.clone(), context.clone())
                    .await
                    .map_err(|error| ProjectionError::handler(EVENT_FAILED, error))?;
            }
        }
        Ok(true)
    }
}

/// Immutable dispatch table from event type to mappings.
pub struct EventMap<P: Projection> {
    handlers: HashMap<&'static str, Vec<Box<dyn EventHandler<P>>>>,
}

impl<P: Projection> EventMap<P> {
    pub fn builder() -> EventMapBuilder<P> {
        EventMapBuilder::new()
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Runs every mapping registered for the event. Unmapped events are not
    /// an error; the result tells whether anything handled the event.
    pub async fn handle(
        &self,
        envelope: &EventEnvelope,
        context: &ProjectionContext,
        operations: &dyn ProjectionOperations<P>,
    ) -> Result<bool, ProjectionError> {
        let Some(handlers) = self.handlers.get(envelope.event_type()) else {
            return Ok(false);
        };
        let mut handled = false;
        for handler in handlers {
            handled |= handler.handle(envelope, context, operations).await?;
        }
        Ok(handled)
    }
}
