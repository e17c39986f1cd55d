//! Worker process supervisor
//!
//! Owns the only handle to the worker child process. Everything else sees the
//! worker through [`WorkerReadiness`] or a [`WorkerSnapshot`].

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use super::state::{
    HealthStatus, WorkerFailure, WorkerHealth, WorkerReadiness, WorkerSnapshot, WorkerState,
};
use crate::config::WorkerConfig;
use crate::error::SupervisorError;

/// What one watchdog check did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCheck {
    /// Supervision is off (stopped, or given up after too many failures)
    Unsupervised,
    /// The worker is still running
    Alive,
    /// The worker had exited; a restart was attempted
    Restarted { attempt: u32, ready: bool },
    /// The worker had exited and the restart budget is spent
    GaveUp,
}

struct Lifecycle {
    child: Option<Child>,
    supervised: bool,
    consecutive_failures: u32,
    last_failure: Option<WorkerFailure>,
}

/// Starts, stops, restarts and health-checks the worker process
pub struct WorkerSupervisor {
    config: WorkerConfig,
    http: reqwest::Client,
    lifecycle: Mutex<Lifecycle>,
    status: watch::Sender<WorkerSnapshot>,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerConfig) -> Self {
        let (status, _) = watch::channel(WorkerSnapshot::stopped());

        Self {
            config,
            http: reqwest::Client::new(),
            lifecycle: Mutex::new(Lifecycle {
                child: None,
                supervised: false,
                consecutive_failures: 0,
                last_failure: None,
            }),
            status,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn readiness(&self) -> WorkerReadiness {
        WorkerReadiness::new(self.status.subscribe())
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        self.status.borrow().clone()
    }

    /// Start the worker and wait for its ready line.
    ///
    /// A no-op returning the current pid when a worker is already running.
    /// Turns supervision on, so a failed start is retried by the watchdog.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<u32, SupervisorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.supervised = true;
        self.start_locked(&mut lifecycle).await
    }

    /// Terminate the worker and turn supervision off
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.supervised = false;

        if let Some(child) = lifecycle.child.take() {
            terminate(child, self.config.stop_grace()).await;
        }

        self.publish(&lifecycle, WorkerState::Stopped, None);
    }

    /// Manual restart: replace the worker, reset the failure count and
    /// re-enable supervision. Returns the new pid once the worker is ready.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<u32, SupervisorError> {
        info!("Manual worker restart requested");
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(child) = lifecycle.child.take() {
            terminate(child, self.config.restart_grace()).await;
        }

        lifecycle.consecutive_failures = 0;
        lifecycle.last_failure = None;
        lifecycle.supervised = true;
        self.start_locked(&mut lifecycle).await
    }

    /// One watchdog tick: detect an exited worker and apply the retry policy.
    ///
    /// While supervised, a missing child counts as an exit, so a start that
    /// failed outright is retried the same way as a crash.
    pub async fn check_worker(&self) -> WorkerCheck {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.supervised {
            return WorkerCheck::Unsupervised;
        }

        // Only a worker that reached ready is kept as the child
        let exit = match lifecycle.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => return WorkerCheck::Alive,
                Ok(Some(status)) => Some(status.to_string()),
                Err(e) => Some(format!("wait failed: {e}")),
            },
            None => None,
        };

        lifecycle.child = None;
        match exit {
            Some(exit) => {
                let pid = self.snapshot().pid;
                warn!(pid, exit = %exit, "Worker crashed after becoming ready");
                lifecycle.last_failure = Some(WorkerFailure::CrashedAfterReady);
            },
            None => warn!(last_failure = ?lifecycle.last_failure, "Worker is not running"),
        }

        if lifecycle.consecutive_failures < self.config.max_restarts {
            lifecycle.consecutive_failures += 1;
            let attempt = lifecycle.consecutive_failures;
            info!(attempt, max = self.config.max_restarts, "Restarting worker");
            self.publish(&lifecycle, WorkerState::Degraded, None);

            let ready = match self.start_locked(&mut lifecycle).await {
                Ok(_) => true,
                Err(e) => {
                    error!(attempt, error = %e, "Worker restart failed");
                    false
                },
            };
            WorkerCheck::Restarted { attempt, ready }
        } else {
            error!(
                failures = lifecycle.consecutive_failures,
                "Max consecutive restarts reached; worker supervision disabled until manual restart"
            );
            lifecycle.supervised = false;
            self.publish(&lifecycle, WorkerState::Failed, None);
            WorkerCheck::GaveUp
        }
    }

    /// Classify worker health. Never fails and never waits on a start or
    /// restart in progress.
    pub async fn health_status(&self) -> WorkerHealth {
        let snapshot = self.snapshot();

        let alive = match self.lifecycle.try_lock() {
            Ok(mut lifecycle) => lifecycle
                .child
                .as_mut()
                .is_some_and(|child| matches!(child.try_wait(), Ok(None))),
            // Someone is starting or stopping the worker; trust the last published state
            Err(_) => snapshot.pid.is_some(),
        };

        let status = if alive {
            self.probe().await
        } else {
            HealthStatus::Down
        };

        WorkerHealth {
            status,
            state: snapshot.state,
            pid: snapshot.pid,
            consecutive_failures: snapshot.consecutive_failures,
            last_failure: snapshot.last_failure,
            max_retries_allowed: self.config.max_restarts,
        }
    }

    async fn probe(&self) -> HealthStatus {
        let request = self
            .http
            .get(&self.config.health_url)
            .timeout(self.config.health_probe_timeout());

        match request.send().await {
            Ok(response) if response.status().is_success() => HealthStatus::Ok,
            Ok(response) => {
                debug!(status = %response.status(), "Worker health endpoint not ok");
                HealthStatus::Unhealthy
            },
            Err(e) => {
                debug!(error = %e, "Worker health endpoint unreachable");
                HealthStatus::Unreachable
            },
        }
    }

    async fn start_locked(&self, lifecycle: &mut Lifecycle) -> Result<u32, SupervisorError> {
        let ready = self.status.borrow().state.is_usable();
        if let Some(mut child) = lifecycle.child.take() {
            match (ready, child.try_wait(), child.id()) {
                (true, Ok(None), Some(pid)) => {
                    debug!(pid, "Worker already running");
                    lifecycle.child = Some(child);
                    return Ok(pid);
                },
                _ => terminate(child, self.config.stop_grace()).await,
            }
        }

        self.publish(lifecycle, WorkerState::Starting, None);

        let result = self.spawn_until_ready(lifecycle).await;
        match &result {
            Ok(pid) => {
                info!(pid, "Worker ready");
                self.publish(lifecycle, WorkerState::Ready, Some(*pid));
            },
            Err(e) => {
                warn!(error = %e, "Worker failed to start");
                lifecycle.last_failure = Some(e.failure());
                self.publish(lifecycle, WorkerState::Degraded, None);
            },
        }
        result
    }

    async fn spawn_until_ready(&self, lifecycle: &mut Lifecycle) -> Result<u32, SupervisorError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        info!(pid, command = %self.config.command, "Worker spawned, waiting for ready line");

        if let Some(stderr) = child.stderr.take() {
            let stderr = BufReader::new(stderr).lines();
            tokio::spawn(forward_output(stderr, pid, OutputStream::Stderr));
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let ready_line = self.config.ready_line.as_str();
        let wait_ready = async {
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                debug!(pid, "[worker] {line}");
                if line == ready_line {
                    return Ok(true);
                }
            }
            Ok::<bool, std::io::Error>(false)
        };

        let waited = timeout(self.config.start_timeout(), wait_ready).await;
        match waited {
            Ok(Ok(true)) => {
                tokio::spawn(forward_output(lines, pid, OutputStream::Stdout));
                lifecycle.child = Some(child);
                Ok(pid)
            },
            Ok(Ok(false)) => {
                // stdout closed; the process may still be running
                terminate(child, self.config.stop_grace()).await;
                Err(SupervisorError::ExitedBeforeReady)
            },
            Ok(Err(e)) => {
                terminate(child, Duration::ZERO).await;
                Err(SupervisorError::Io(e))
            },
            Err(_) => {
                warn!(pid, "Worker did not signal ready in time; killing it");
                terminate(child, Duration::ZERO).await;
                Err(SupervisorError::StartTimeout(self.config.start_timeout()))
            },
        }
    }

    fn publish(&self, lifecycle: &Lifecycle, state: WorkerState, pid: Option<u32>) {
        self.status.send_replace(WorkerSnapshot {
            state,
            pid,
            consecutive_failures: lifecycle.consecutive_failures,
            last_failure: lifecycle.last_failure,
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

async fn forward_output<R>(mut lines: Lines<BufReader<R>>, pid: u32, kind: OutputStream)
where
    R: AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        match kind {
            OutputStream::Stdout => debug!(pid, "[worker] {line}"),
            OutputStream::Stderr => warn!(pid, "[worker stderr] {line}"),
        }
    }
}

/// Ask the child to exit, then kill it if it is still alive after `grace`
async fn terminate(mut child: Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    let pid = child.id();

    if !grace.is_zero() {
        info!(pid, grace_secs = grace.as_secs(), "Stopping worker");
        send_terminate(&mut child);

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid, %status, "Worker exited");
                return;
            },
            Ok(Err(e)) => warn!(pid, error = %e, "Failed to wait for worker"),
            Err(_) => warn!(pid, "Worker did not exit within grace period; killing"),
        }
    }

    if let Err(e) = child.kill().await {
        warn!(pid, error = %e, "Failed to kill worker");
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // id() is None once the child has been reaped
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed; killing worker");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(command: &str) -> WorkerConfig {
        WorkerConfig {
            command: command.to_string(),
            args: Vec::new(),
            health_url: "http://127.0.0.1:9/health".to_string(),
            start_timeout_secs: 1,
            health_probe_timeout_ms: 200,
            ..WorkerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_new_supervisor_is_stopped() {
        let supervisor = WorkerSupervisor::new(config_for("true"));
        let snapshot = supervisor.snapshot();
        assert_eq!(snapshot.state, WorkerState::Stopped);
        assert!(snapshot.pid.is_none());
        assert!(!supervisor.readiness().is_usable());
    }

    #[tokio::test]
    async fn test_unsupervised_check_does_nothing() {
        let supervisor = WorkerSupervisor::new(config_for("true"));
        assert_eq!(supervisor.check_worker().await, WorkerCheck::Unsupervised);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let supervisor = WorkerSupervisor::new(config_for("/nonexistent/rhapi-worker"));
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert_eq!(supervisor.snapshot().state, WorkerState::Degraded);
        assert_eq!(supervisor.snapshot().last_failure, Some(WorkerFailure::SpawnFailed));
    }

    #[tokio::test]
    async fn test_health_without_worker_is_down() {
        let supervisor = WorkerSupervisor::new(config_for("true"));
        let health = supervisor.health_status().await;
        assert_eq!(health.status, HealthStatus::Down);
        assert_eq!(health.max_retries_allowed, 3);
    }
}
