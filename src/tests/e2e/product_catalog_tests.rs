use crate::modules::projections::adapters::inbound::in_memory_event_source::InMemoryEventSource;
use crate::modules::projections::cache::lru_cache::CacheOptions;
use crate::modules::projections::core::errors::ProjectorError;
use crate::modules::projections::core::projection::Projection;
use crate::modules::projections::core::transaction::EventEnvelope;
use crate::modules::projections::use_cases::project_transactions::handler::TransactionHandler;
use crate::modules::projections::use_cases::project_transactions::options::ProjectorOptions;
use crate::shared::infrastructure::cancellation::{CancellationSource, CancellationToken};
use crate::shared::infrastructure::store::in_memory::InMemoryStore;
use crate::shell::catalog::{
    CategoryDiscontinued, CategoryLookup, DiscontinuedCategory, ProductAdded, ProductCatalogEntry,
    ProductMoved,
};
use crate::shell::state::AppState;
use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::Arc;

type BeforeEachReturn = (Arc<InMemoryStore>, InMemoryEventSource, AppState);

#[fixture]
fn before_each() -> BeforeEachReturn {
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::new(
        store.clone(),
        ProjectorOptions::default().with_batch_size(10),
        &CacheOptions::default(),
    )
    .unwrap();
    (store, InMemoryEventSource::new(), state)
}

fn added(key: &str, category: &str) -> EventEnvelope {
    EventEnvelope::new(ProductAdded {
        product_key: key.into(),
        category: category.into(),
    })
}

#[rstest]
#[tokio::test]
async fn it_should_project_a_new_product_into_the_catalog_and_the_lookup(
    before_each: BeforeEachReturn,
) {
    let (store, source, state) = before_each;
    source
        .subscribe(None, state.projector.clone(), CancellationToken::none())
        .await
        .unwrap();

    source
        .write("products", vec![added("c350E", "Hybrid")])
        .await
        .unwrap();

    assert_eq!(
        store
            .document(ProductCatalogEntry::COLLECTION, "c350E")
            .await,
        Some(json!({ "id": "c350E", "category": "Hybrid" }))
    );
    assert_eq!(
        store.document(CategoryLookup::COLLECTION, "Hybrid").await,
        Some(json!({ "category": "Hybrid", "product_count": 1 }))
    );
    let projector_state = state.projector.get_state().await.unwrap().unwrap();
    assert_eq!(projector_state.checkpoint, 1);
    assert_eq!(projector_state.last_stream_id.as_deref(), Some("products"));
    assert_eq!(state.cache.current_count().await, 1);
}

#[rstest]
#[tokio::test]
async fn it_should_catch_up_on_history_and_resume_after_a_restart(
    before_each: BeforeEachReturn,
) {
    let (store, source, state) = before_each;
    source
        .write("products", vec![added("c350E", "Hybrid")])
        .await
        .unwrap();
    source
        .write(
            "products",
            vec![
                added("c400E", "Hybrid"),
                EventEnvelope::new(ProductMoved {
                    product_key: "c350E".into(),
                    category: "Electric".into(),
                }),
            ],
        )
        .await
        .unwrap();

    let first_run = CancellationSource::new();
    source
        .subscribe(None, state.projector.clone(), first_run.token())
        .await
        .unwrap();
    first_run.cancel();

    let restarted = AppState::new(
        store.clone(),
        ProjectorOptions::default(),
        &CacheOptions::default(),
    )
    .unwrap();
    let last_checkpoint = restarted.projector.get_last_checkpoint().await.unwrap();
    source
        .subscribe(
            last_checkpoint,
            restarted.projector.clone(),
            CancellationToken::none(),
        )
        .await
        .unwrap();
    source
        .write("products", vec![added("c500E", "Hybrid")])
        .await
        .unwrap();

    assert_eq!(last_checkpoint, Some(2));
    assert_eq!(
        store
            .document(ProductCatalogEntry::COLLECTION, "c350E")
            .await
            .unwrap()["category"],
        "Electric"
    );
    assert_eq!(
        store.document(CategoryLookup::COLLECTION, "Hybrid").await.unwrap()["product_count"],
        3
    );
    assert_eq!(restarted.projector.get_last_checkpoint().await.unwrap(), Some(3));
}

#[rstest]
#[tokio::test]
async fn it_should_run_custom_actions_and_child_deletes_in_one_transaction(
    before_each: BeforeEachReturn,
) {
    let (store, source, state) = before_each;
    let handler: Arc<dyn TransactionHandler> = state.projector.clone();
    source
        .subscribe(None, handler, CancellationToken::none())
        .await
        .unwrap();
    source
        .write("products", vec![added("c350E", "Hybrid")])
        .await
        .unwrap();

    source
        .write(
            "categories",
            vec![EventEnvelope::new(CategoryDiscontinued {
                category: "Hybrid".into(),
            })],
        )
        .await
        .unwrap();

    assert!(
        store
            .document(CategoryLookup::COLLECTION, "Hybrid")
            .await
            .is_none()
    );
    let discontinued = store
        .document(DiscontinuedCategory::COLLECTION, "Hybrid")
        .await
        .unwrap();
    assert_eq!(discontinued["category"], "Hybrid");
    assert_eq!(state.projector.get_last_checkpoint().await.unwrap(), Some(2));
}

#[rstest]
#[tokio::test]
async fn it_should_surface_a_failing_projection_to_the_writer(before_each: BeforeEachReturn) {
    let (store, source, state) = before_each;
    source
        .subscribe(None, state.projector.clone(), CancellationToken::none())
        .await
        .unwrap();
    source
        .write("products", vec![added("c350E", "Hybrid")])
        .await
        .unwrap();

    let result = source
        .write("products", vec![added("c350E", "Electric")])
        .await;

    let Err(ProjectorError::Projection(error)) = result else {
        panic!("expected a projection error");
    };
    assert_eq!(
        error.message(),
        "Projection ProductCatalogEntry with key c350E already exists."
    );
    assert_eq!(
        store.document(CategoryLookup::COLLECTION, "Hybrid").await.unwrap()["product_count"],
        1
    );
    assert_eq!(store.count(CategoryLookup::COLLECTION).await, 1);
    assert_eq!(state.projector.get_last_checkpoint().await.unwrap(), Some(1));
}
