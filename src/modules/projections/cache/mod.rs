use crate::modules::projections::core::projection::{Projection, ProjectionHandle};
use crate::shared::core::primitives::BoxFuture;
use crate::shared::infrastructure::store::StoreError;
use async_trait::async_trait;

/// Loads a projection from the backing store on a cache miss.
pub type ProjectionLoader<'a, P> = BoxFuture<'a, Result<Option<ProjectionHandle<P>>, StoreError>>;

/// Write-through cache in front of the store. Implementations must be safe to
/// clear at any time: the projector empties it after every failed batch.
#[async_trait]
pub trait ProjectionCache<P: Projection>: Send + Sync {
    /// Adds the projection unless its key is already cached.
    async fn add(&self, projection: ProjectionHandle<P>);

    /// Returns the cached projection, or awaits `load` once and caches a
    /// present result.
    async fn get<'a>(
        &'a self,
        key: &'a P::Key,
        load: ProjectionLoader<'a, P>,
    ) -> Result<Option<ProjectionHandle<P>>, StoreError>;

    async fn remove(&self, key: &P::Key);

    async fn clear(&self);
}

pub mod lru_cache;
pub mod passthrough;
