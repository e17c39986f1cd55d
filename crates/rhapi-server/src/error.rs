//! Server error types
//!
//! Page fetch failures never appear here: they are folded into exhausted
//! [`FetchOutcome`](crate::catalog::FetchOutcome)s at the fetcher boundary.
//! Index failures stop at the index boundary too; [`IndexError`] is only
//! returned from the index's own constructor and maintenance calls.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::worker::WorkerFailure;

/// Result type alias for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Errors surfaced by the catalog facade to its callers
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The worker is not ready (never started, restarting, or given up on),
    /// or a scan could not visit every page
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The item is absent from a completely scanned catalog
    #[error("Item not found: {0}")]
    NotFound(String),
}

/// Worker lifecycle failures
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn worker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker is running but never printed its ready line in time
    #[error("Worker did not signal ready within {0:?}")]
    StartTimeout(std::time::Duration),

    /// The worker closed stdout (usually by exiting) before signalling ready
    #[error("Worker exited before signalling ready")]
    ExitedBeforeReady,

    #[error("Worker IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Failure kind recorded in the worker snapshot
    pub fn failure(&self) -> WorkerFailure {
        match self {
            SupervisorError::Spawn { .. } => WorkerFailure::SpawnFailed,
            SupervisorError::StartTimeout(_) => WorkerFailure::StartTimeout,
            SupervisorError::ExitedBeforeReady | SupervisorError::Io(_) => WorkerFailure::ExitedBeforeReady,
        }
    }
}

/// Location index store failures
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Index migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// HTTP-facing error
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Catalog(CatalogError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Item not found".to_string())
            },
            AppError::Catalog(CatalogError::WorkerUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "Catalog request degraded");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            },
            AppError::Supervisor(SupervisorError::StartTimeout(_)) => {
                tracing::error!("Restart timed out: worker did not signal ready");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Worker started but timed out waiting for ready signal".to_string(),
                )
            },
            AppError::Supervisor(e) => {
                tracing::error!(error = %e, "Worker restart failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            },
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(CatalogError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (
                AppError::from(CatalogError::WorkerUnavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(SupervisorError::StartTimeout(Duration::from_secs(1))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                AppError::from(SupervisorError::ExitedBeforeReady),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::BadRequest("id".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("key".into()), StatusCode::UNAUTHORIZED),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
