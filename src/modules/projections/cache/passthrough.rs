use crate::modules::projections::cache::{ProjectionCache, ProjectionLoader};
use crate::modules::projections::core::projection::{Projection, ProjectionHandle};
use crate::shared::infrastructure::store::StoreError;
use async_trait::async_trait;

/// Caches nothing; every lookup goes to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCache;

#[async_trait]
impl<P: Projection> ProjectionCache<P> for PassthroughCache {
    async fn add(&self, _projection: ProjectionHandle<P>) {}

    async fn get<'a>(
        &'a self,
        _key: &'a P::Key,
        load: ProjectionLoader<'a, P>,
    ) -> Result<Option<ProjectionHandle<P>>, StoreError> {
        load.await
    }

    async fn remove(&self, _key: &P::Key) {}

    async fn clear(&self) {}
}
