use crate::modules::projections::cache::lru_cache::{CacheOptions, LruProjectionCache};
use crate::modules::projections::core::errors::ConfigError;
use crate::modules::projections::use_cases::project_transactions::child_projector::ChildProjector;
use crate::modules::projections::use_cases::project_transactions::handler::Projector;
use crate::modules::projections::use_cases::project_transactions::mapper::EventMapProjector;
use crate::modules::projections::use_cases::project_transactions::options::ProjectorOptions;
use crate::shared::infrastructure::store::Store;
use crate::shell::catalog::{
    CatalogProjectorState, CategoryLookup, ProductCatalogEntry, catalog_event_map,
    category_lookup_map,
};
use std::sync::Arc;

pub type CatalogProjector = Projector<ProductCatalogEntry, CatalogProjectorState>;

#[derive(Clone)]
pub struct AppState {
    pub projector: Arc<CatalogProjector>,
    pub cache: Arc<LruProjectionCache<ProductCatalogEntry>>,
}

impl AppState {
    /// Wires the catalog projector, with the category lookup as child, on top of `store`.
    pub fn new(
        store: Arc<dyn Store>,
        options: ProjectorOptions,
        cache_options: &CacheOptions,
    ) -> Result<Self, ConfigError> {
        cache_options.validate()?;
        let cache = Arc::new(LruProjectionCache::<ProductCatalogEntry>::from_options(
            cache_options,
        )?);
        let lookup_cache = Arc::new(LruProjectionCache::<CategoryLookup>::from_options(
            cache_options,
        )?);
        let lookup: Arc<dyn ChildProjector> =
            Arc::new(EventMapProjector::new(category_lookup_map()).with_cache(lookup_cache));
        let mapper = EventMapProjector::new(catalog_event_map())
            .with_cache(cache.clone())
            .with_children(vec![lookup]);
        let projector = CatalogProjector::new(store, mapper, options)?
            .with_enrich_state(CatalogProjectorState::enrich);
        Ok(Self {
            projector: Arc::new(projector),
            cache,
        })
    }
}
