use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tracing::error;

use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/statistics", get(statistics))
        .route("/products/{key}", get(product))
        .with_state(state)
}

pub async fn statistics(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.cache.statistics().await;
    match state.projector.get_last_checkpoint().await {
        Ok(checkpoint) => Json(json!({
            "checkpoint": checkpoint,
            "cache": cache,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to read the projector state");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn product(State(state): State<AppState>, Path(key): Path<String>) -> impl IntoResponse {
    match state.projector.find(&key).await {
        Ok(Some(found)) => Json(found).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, key = %key, "failed to load product");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
