// Product catalog read model.
//
// Purpose
// - Give the service (and its tests) a concrete projection to run the engine with.
//
// Responsibilities
// - Define the catalog events and the projections derived from them.
// - Describe how each event changes the catalog and the per-category lookup.
// - Keep the stream of the last projected transaction in the projector state.
// - Register the event tags understood by the JSON lines source.

use crate::modules::projections::adapters::inbound::json_lines_event_source::EventTypeRegistry;
use crate::modules::projections::core::context::ProjectionContext;
use crate::modules::projections::core::projection::Projection;
use crate::modules::projections::core::projector_state::ProjectorState;
use crate::modules::projections::core::transaction::{Event, Transaction};
use crate::modules::projections::event_map::EventMap;
use crate::shared::core::primitives::Checkpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAdded {
    pub product_key: String,
    pub category: String,
}

impl Event for ProductAdded {
    const EVENT_TYPE: &'static str = "ProductAdded";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMoved {
    pub product_key: String,
    pub category: String,
}

impl Event for ProductMoved {
    const EVENT_TYPE: &'static str = "ProductMoved";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDiscontinued {
    pub product_key: String,
}

impl Event for ProductDiscontinued {
    const EVENT_TYPE: &'static str = "ProductDiscontinued";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDiscontinued {
    pub category: String,
}

impl Event for CategoryDiscontinued {
    const EVENT_TYPE: &'static str = "CategoryDiscontinued";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalogEntry {
    pub id: String,
    pub category: Option<String>,
}

impl Projection for ProductCatalogEntry {
    type Key = String;
    const COLLECTION: &'static str = "product_catalog";

    fn with_key(key: String) -> Self {
        Self {
            id: key,
            category: None,
        }
    }

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Number of products per category, maintained by a child projector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLookup {
    pub category: String,
    pub product_count: u64,
}

impl Projection for CategoryLookup {
    type Key = String;
    const COLLECTION: &'static str = "category_lookup";

    fn with_key(key: String) -> Self {
        Self {
            category: key,
            product_count: 0,
        }
    }

    fn key(&self) -> String {
        self.category.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscontinuedCategory {
    pub category: String,
    pub discontinued_at: DateTime<Utc>,
}

impl DiscontinuedCategory {
    pub const COLLECTION: &'static str = "discontinued_categories";
}

pub fn catalog_event_map() -> EventMap<ProductCatalogEntry> {
    let mut builder = EventMap::<ProductCatalogEntry>::builder();
    builder
        .map::<ProductAdded>()
        .as_create_of(|e| e.product_key.clone())
        .using(|entry, e, _| {
            entry.category = Some(e.category.clone());
            Ok(())
        });
    builder
        .map::<ProductMoved>()
        .as_update_of(|e| e.product_key.clone())
        .using(|entry, e, _| {
            entry.category = Some(e.category.clone());
            Ok(())
        });
    builder
        .map::<ProductDiscontinued>()
        .as_delete_of(|e| e.product_key.clone());
    builder
        .map::<CategoryDiscontinued>()
        .as_custom(|e: Arc<CategoryDiscontinued>, ctx: ProjectionContext| async move {
            let record = DiscontinuedCategory {
                category: e.category.clone(),
                discontinued_at: ctx.timestamp_utc,
            };
            ctx.session
                .save(DiscontinuedCategory::COLLECTION, &e.category, &record)
                .await?;
            anyhow::Ok(())
        });
    builder.build()
}

pub fn category_lookup_map() -> EventMap<CategoryLookup> {
    let mut builder = EventMap::<CategoryLookup>::builder();
    builder
        .map::<ProductAdded>()
        .as_update_of(|e| e.category.clone())
        .creating_if_missing()
        .using(|lookup, _, _| {
            lookup.product_count += 1;
            Ok(())
        });
    builder
        .map::<CategoryDiscontinued>()
        .as_delete_of(|e| e.category.clone())
        .ignoring_misses();
    builder.build()
}

/// Projector state that also remembers which stream was projected last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProjectorState {
    pub id: String,
    pub checkpoint: Checkpoint,
    pub last_update_utc: DateTime<Utc>,
    pub last_stream_id: Option<String>,
}

impl CatalogProjectorState {
    pub fn enrich(&mut self, transaction: &Transaction) -> anyhow::Result<()> {
        self.last_stream_id = Some(transaction.stream_id.clone());
        Ok(())
    }
}

impl ProjectorState for CatalogProjectorState {
    fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            checkpoint: 0,
            last_update_utc: DateTime::<Utc>::default(),
            last_stream_id: None,
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = checkpoint;
    }

    fn set_last_update_utc(&mut self, at: DateTime<Utc>) {
        self.last_update_utc = at;
    }
}

pub fn registry() -> EventTypeRegistry {
    EventTypeRegistry::new()
        .register::<ProductAdded>()
        .register::<ProductMoved>()
        .register::<ProductDiscontinued>()
        .register::<CategoryDiscontinued>()
}
