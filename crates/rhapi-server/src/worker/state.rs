//! Worker lifecycle states and the read-only projections other components see

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle state of the worker process.
///
/// `Stopped → Starting → Ready`; an unexpected exit moves `Ready` to
/// `Degraded` while a restart is pending, and to `Failed` once the restart
/// budget is spent. Only a manual restart leaves `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Ready,
    Degraded,
    Failed,
}

impl WorkerState {
    pub fn is_usable(self) -> bool {
        matches!(self, WorkerState::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Starting => "starting",
            WorkerState::Ready => "ready",
            WorkerState::Degraded => "degraded",
            WorkerState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the worker last stopped being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFailure {
    /// The process could not be launched at all
    SpawnFailed,
    /// The process ran but never printed its ready line in time
    StartTimeout,
    /// The process closed stdout or exited before printing its ready line
    ExitedBeforeReady,
    /// The process reached ready and later exited on its own
    CrashedAfterReady,
}

impl WorkerFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerFailure::SpawnFailed => "spawn failed",
            WorkerFailure::StartTimeout => "start timed out",
            WorkerFailure::ExitedBeforeReady => "exited before ready",
            WorkerFailure::CrashedAfterReady => "crashed after ready",
        }
    }
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub consecutive_failures: u32,
    /// Most recent failure since the last manual restart
    pub last_failure: Option<WorkerFailure>,
}

impl WorkerSnapshot {
    pub(crate) fn stopped() -> Self {
        Self {
            state: WorkerState::Stopped,
            pid: None,
            consecutive_failures: 0,
            last_failure: None,
        }
    }
}

/// Worker health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Process alive and the health endpoint answered 2xx
    Ok,
    /// Process alive, health endpoint answered with a non-success status
    Unhealthy,
    /// Process alive, health endpoint did not answer in time
    Unreachable,
    /// No live worker process
    Down,
}

impl HealthStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, HealthStatus::Ok)
    }
}

/// Result of a health query
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub status: HealthStatus,
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub consecutive_failures: u32,
    pub last_failure: Option<WorkerFailure>,
    pub max_retries_allowed: u32,
}

/// Cheap, cloneable "is the worker usable" signal.
///
/// This is the only view of the worker that components other than the
/// supervisor hold.
#[derive(Debug, Clone)]
pub struct WorkerReadiness {
    rx: watch::Receiver<WorkerSnapshot>,
}

impl WorkerReadiness {
    pub(crate) fn new(rx: watch::Receiver<WorkerSnapshot>) -> Self {
        Self { rx }
    }

    pub fn is_usable(&self) -> bool {
        self.rx.borrow().state.is_usable()
    }

    pub fn state(&self) -> WorkerState {
        self.rx.borrow().state
    }

    /// Wait until the worker reaches `target`, giving up after `within`
    pub async fn wait_for(&self, target: WorkerState, within: Duration) -> bool {
        let mut rx = self.rx.clone();
        let waited = tokio::time::timeout(within, rx.wait_for(|snapshot| snapshot.state == target)).await;
        matches!(waited, Ok(Ok(_)))
    }

    /// State, with the last failure appended when there is one
    pub fn describe(&self) -> String {
        let snapshot = self.rx.borrow();
        match snapshot.last_failure {
            Some(failure) => format!("{} ({failure})", snapshot.state),
            None => snapshot.state.to_string(),
        }
    }
}
