use crate::modules::projections::core::context::ProjectionContext;
use crate::modules::projections::core::errors::ProjectionError;
use crate::modules::projections::core::transaction::EventEnvelope;
use async_trait::async_trait;

/// A projector nested under another one. Children see every event before
/// their parent, inside the parent's storage transaction.
#[async_trait]
pub trait ChildProjector: Send + Sync {
    /// Returns whether the child handled the event.
    async fn project_event(
        &self,
        envelope: &EventEnvelope,
        context: &ProjectionContext,
    ) -> Result<bool, ProjectionError>;

    /// Called when the parent batch fails.
    async fn clear_cache(&self);
}
