//! API response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::{HealthStatus, WorkerHealth};

/// `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when the worker answers its health probe, `degraded` otherwise
    pub status: &'static str,
    pub worker: WorkerHealth,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn new(worker: WorkerHealth) -> Self {
        let status = match worker.status {
            HealthStatus::Ok => "ok",
            _ => "degraded",
        };

        Self {
            status,
            worker,
            timestamp: Utc::now(),
        }
    }
}

/// `POST /worker/restart`
#[derive(Debug, Serialize)]
pub struct RestartResponse {
    pub status: &'static str,
    pub message: String,
    pub new_pid: u32,
}

impl RestartResponse {
    pub fn success(new_pid: u32) -> Self {
        Self {
            status: "success",
            message: "Worker restarted and ready".to_string(),
            new_pid,
        }
    }
}

/// `GET /item` query string
#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub id: Option<String>,
}
