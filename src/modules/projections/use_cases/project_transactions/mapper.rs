// Applies an event map to projections of one type.
//
// Purpose
// - Bridge the declarative event map with the cache and the storage transaction.
//
// Responsibilities
// - Load projections through the cache, falling back to the store.
// - Enforce duplicate and missing policies for creates, updates and deletes.
// - Skip projections rejected by the filter.
// - Run child projectors before the own map, sharing the same context.

use crate::modules::projections::cache::passthrough::PassthroughCache;
use crate::modules::projections::cache::{ProjectionCache, ProjectionLoader};
use crate::modules::projections::core::context::ProjectionContext;
use crate::modules::projections::core::errors::{EVENT_FAILED, ProjectionError};
use crate::modules::projections::core::projection::{Projection, ProjectionHandle};
use crate::modules::projections::core::transaction::EventEnvelope;
use crate::modules::projections::event_map::{
    DuplicatePolicy, EventMap, MissingPolicy, Mutation, ProjectionOperations,
};
use crate::modules::projections::use_cases::project_transactions::child_projector::ChildProjector;
use crate::shared::core::primitives::short_type_name;
use crate::shared::infrastructure::store::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub type ProjectionFilter<P> = Arc<dyn Fn(&P) -> bool + Send + Sync>;

pub struct EventMapProjector<P: Projection> {
    map: EventMap<P>,
    cache: Arc<dyn ProjectionCache<P>>,
    filter: ProjectionFilter<P>,
    children: Vec<Arc<dyn ChildProjector>>,
}

impl<P: Projection> EventMapProjector<P> {
    pub fn new(map: EventMap<P>) -> Self {
        Self {
            map,
            cache: Arc::new(PassthroughCache),
            filter: Arc::new(|_: &P| true),
            children: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ProjectionCache<P>>) -> Self {
        self.cache = cache;
        self
    }

    /// Projections failing `filter` are left alone by updates, overwrites and deletes.
    pub fn with_filter(mut self, filter: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_children(mut self, children: Vec<Arc<dyn ChildProjector>>) -> Self {
        self.children = children;
        self
    }

    pub fn cache(&self) -> &Arc<dyn ProjectionCache<P>> {
        &self.cache
    }

    pub async fn project_event(
        &self,
        envelope: &EventEnvelope,
        context: &ProjectionContext,
    ) -> Result<bool, ProjectionError> {
        let mut handled = false;
        for child in &self.children {
            handled |= child.project_event(envelope, context).await?;
        }
        handled |= self.map.handle(envelope, context, self).await?;
        Ok(handled)
    }

    /// Empties the own cache and the caches of every child.
    pub async fn clear_caches(&self) {
        self.cache.clear().await;
        for child in &self.children {
            child.clear_cache().await;
        }
    }

    async fn load(
        &self,
        key: &P::Key,
        context: &ProjectionContext,
    ) -> Result<Option<ProjectionHandle<P>>, ProjectionError> {
        let session = context.session.clone();
        let document_key = key.to_string();
        let loader: ProjectionLoader<'_, P> = Box::pin(async move {
            let found: Option<P> = session.get(P::COLLECTION, &document_key).await?;
            Ok::<_, StoreError>(found.map(ProjectionHandle::new))
        });
        self.cache.get(key, loader).await.map_err(|error| {
            ProjectionError::storage(
                format!("Failed to load {} with key {}.", short_type_name::<P>(), key),
                error,
            )
        })
    }

    async fn persist(
        &self,
        key: &P::Key,
        projection: &P,
        context: &ProjectionContext,
    ) -> Result<(), ProjectionError> {
        context
            .session
            .save(P::COLLECTION, &key.to_string(), projection)
            .await
            .map_err(|error| {
                ProjectionError::storage(
                    format!("Failed to save {} with key {}.", short_type_name::<P>(), key),
                    error,
                )
            })
    }

    async fn insert(
        &self,
        key: P::Key,
        context: &ProjectionContext,
        mutation: Mutation<'_, P>,
    ) -> Result<(), ProjectionError> {
        let projection = ProjectionHandle::new(P::with_key(key));
        {
            let mut state = projection.lock().await;
            mutation(&mut *state, context).map_err(|e| ProjectionError::handler(EVENT_FAILED, e))?;
            self.persist(projection.key(), &state, context).await?;
        }
        self.cache.add(projection).await;
        Ok(())
    }

    async fn apply(
        &self,
        projection: ProjectionHandle<P>,
        context: &ProjectionContext,
        mutation: Mutation<'_, P>,
    ) -> Result<(), ProjectionError> {
        let mut state = projection.lock().await;
        if !(self.filter)(&*state) {
            debug!(key = %projection.key(), "projection filtered out");
            return Ok(());
        }
        mutation(&mut *state, context).map_err(|e| ProjectionError::handler(EVENT_FAILED, e))?;
        self.persist(projection.key(), &state, context).await
    }
}

#[async_trait]
impl<P: Projection> ProjectionOperations<P> for EventMapProjector<P> {
    async fn create<'a>(
        &'a self,
        key: P::Key,
        context: &'a ProjectionContext,
        mutation: Mutation<'a, P>,
        on_duplicate: DuplicatePolicy,
    ) -> Result<(), ProjectionError> {
        let Some(existing) = self.load(&key, context).await? else {
            return self.insert(key, context, mutation).await;
        };
        match on_duplicate {
            DuplicatePolicy::Fail => Err(ProjectionError::duplicate_projection(format!(
                "Projection {} with key {} already exists.",
                short_type_name::<P>(),
                key
            ))),
            DuplicatePolicy::Ignore => Ok(()),
            DuplicatePolicy::Overwrite => self.apply(existing, context, mutation).await,
        }
    }

    async fn update<'a>(
        &'a self,
        key: P::Key,
        context: &'a ProjectionContext,
        mutation: Mutation<'a, P>,
        on_missing: MissingPolicy,
    ) -> Result<(), ProjectionError> {
        if let Some(existing) = self.load(&key, context).await? {
            return self.apply(existing, context, mutation).await;
        }
        match on_missing {
            MissingPolicy::Fail => Err(ProjectionError::missing_projection(format!(
                "Failed to find {} with key {}.",
                short_type_name::<P>(),
                key
            ))),
            MissingPolicy::Ignore => Ok(()),
            MissingPolicy::Create => self.insert(key, context, mutation).await,
        }
    }

    async fn delete<'a>(
        &'a self,
        key: P::Key,
        context: &'a ProjectionContext,
        on_missing: MissingPolicy,
    ) -> Result<(), ProjectionError> {
        let Some(existing) = self.load(&key, context).await? else {
            return match on_missing {
                MissingPolicy::Fail => Err(ProjectionError::missing_projection(format!(
                    "Could not delete {} with key {} because it does not exist.",
                    short_type_name::<P>(),
                    key
                ))),
                MissingPolicy::Ignore | MissingPolicy::Create => Ok(()),
            };
        };
        if !(self.filter)(&*existing.lock().await) {
            debug!(key = %key, "projection filtered out");
            return Ok(());
        }
        context
            .session
            .delete(P::COLLECTION, &key.to_string())
            .await
            .map_err(|error| {
                ProjectionError::storage(
                    format!("Failed to delete {} with key {}.", short_type_name::<P>(), key),
                    error,
                )
            })?;
        self.cache.remove(&key).await;
        Ok(())
    }
}

#[async_trait]
impl<P: Projection> ChildProjector for EventMapProjector<P> {
    async fn project_event(
        &self,
        envelope: &EventEnvelope,
        context: &ProjectionContext,
    ) -> Result<bool, ProjectionError> {
        Self::project_event(self, envelope, context).await
    }

    async fn clear_cache(&self) {
        self.clear_caches().await;
    }
}
