//! HTTP API
//!
//! | Route                  | Handler                       |
//! |------------------------|-------------------------------|
//! | `GET /`                | service name and version      |
//! | `GET /health`          | worker health                 |
//! | `GET /items`           | full catalog listing          |
//! | `GET /item?id=`        | single item                   |
//! | `POST /worker/restart` | manual restart (`X-API-Key`)  |

pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::catalog::Catalog;
use crate::config::CorsConfig;
use crate::middleware::{cors_layer, require_api_key, tracing_layer};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, api_key: Option<&str>) -> Self {
        Self {
            catalog,
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let admin = Router::new()
        .route("/worker/restart", post(routes::restart_worker))
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(root))
        .route("/health", get(routes::health))
        .route("/items", get(routes::list_items))
        .route("/item", get(routes::get_item))
        .merge(admin)
        .layer(cors_layer(cors))
        .layer(tracing_layer())
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "RHAPI",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
