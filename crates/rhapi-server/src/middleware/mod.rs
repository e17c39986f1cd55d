//! Middleware for the RHAPI server
//!
//! - CORS (Cross-Origin Resource Sharing)
//! - Request logging with tracing
//! - API key check for administrative routes

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::api::AppState;
use crate::config::CorsConfig;
use crate::error::AppError;

/// Header carrying the administrative API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Create CORS layer from configuration
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    let wildcard =
        config.allowed_origins.is_empty() || config.allowed_origins.iter().any(|origin| origin == "*");

    if wildcard {
        cors = cors.allow_origin(Any);
        if config.allow_credentials {
            warn!("CORS credentials cannot be combined with a wildcard origin; ignoring allow_credentials");
        }
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);

        if config.allow_credentials {
            cors = cors.allow_credentials(true);
        }
    }

    cors
}

/// Create tracing/logging layer
pub fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

/// Reject requests whose `X-API-Key` does not match the configured key.
///
/// With no key configured every request is rejected.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.api_key.as_deref() else {
        warn!(path = %request.uri().path(), "Rejected admin request: no API key configured");
        return Err(AppError::Unauthorized("API key authentication is not configured".to_string()));
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(expected) {
        warn!(path = %request.uri().path(), "Rejected admin request: invalid API key");
        return Err(AppError::Unauthorized("Invalid or missing API key".to_string()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_with_specific_origins() {
        let config = CorsConfig {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://example.com".to_string(),
            ],
            allow_credentials: true,
        };

        let _layer = cors_layer(&config);
    }

    #[test]
    fn test_cors_layer_wildcard_ignores_credentials() {
        let config = CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        };

        // tower-http panics when wrapping a service with credentials + wildcard
        let _service = tower::ServiceBuilder::new()
            .layer(cors_layer(&config))
            .service(tower::service_fn(|_: axum::http::Request<axum::body::Body>| async {
                Ok::<_, std::convert::Infallible>(axum::response::Response::new(axum::body::Body::empty()))
            }));
    }
}
