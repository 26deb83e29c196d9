use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

use projection_engine::modules::projections::adapters::inbound::json_lines_event_source::JsonLinesEventSource;
use projection_engine::modules::projections::cache::lru_cache::CacheOptions;
use projection_engine::modules::projections::core::projection::Projection;
use projection_engine::modules::projections::use_cases::project_transactions::options::ProjectorOptions;
use projection_engine::shared::infrastructure::cancellation::CancellationSource;
use projection_engine::shared::infrastructure::store::in_memory::InMemoryStore;
use projection_engine::shell::catalog::{ProductCatalogEntry, registry};
use projection_engine::shell::http::router;
use projection_engine::shell::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let options = ProjectorOptions::from_env()?;
    let cache_options = CacheOptions::from_env()?;
    let addr: SocketAddr = std::env::var("APP_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    // In-memory store for now
    let store = Arc::new(
        InMemoryStore::new().with_unique_index(ProductCatalogEntry::COLLECTION, "id"),
    );
    let state = AppState::new(store, options, &cache_options)?;

    let shutdown = CancellationSource::new();
    if let Ok(path) = std::env::var("APP_EVENTS_FILE") {
        let projector = state.projector.clone();
        let token = shutdown.token();
        tokio::spawn(async move {
            let source = JsonLinesEventSource::new(&path, registry());
            let result = match projector.get_last_checkpoint().await {
                Ok(last_checkpoint) => source
                    .deliver(last_checkpoint, projector.as_ref(), &token)
                    .await
                    .map_err(anyhow::Error::from),
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(checkpoint) => tracing::info!(?checkpoint, path = %path, "event log projected"),
                Err(e) => tracing::error!(error = %e, path = %path, "failed to project event log"),
            }
        });
    }

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Statistics endpoint: http://{}/statistics", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
