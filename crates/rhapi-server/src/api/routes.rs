//! Route handlers

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::info;

use super::response::{HealthResponse, ItemQuery, RestartResponse};
use super::AppState;
use crate::catalog::{ItemLookup, Listing};
use crate::error::AppError;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.catalog.health_snapshot().await))
}

pub async fn list_items(State(state): State<AppState>) -> Json<Listing> {
    Json(state.catalog.list_all().await)
}

pub async fn get_item(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<ItemLookup>, AppError> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing 'id' query parameter".to_string()))?;

    Ok(Json(state.catalog.get_by_id(&id).await?))
}

pub async fn restart_worker(State(state): State<AppState>) -> Result<Json<RestartResponse>, AppError> {
    let pid = state.catalog.restart_worker().await?;
    info!(pid, "Worker restarted via API");
    Ok(Json(RestartResponse::success(pid)))
}
