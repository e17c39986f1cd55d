//! Background crash detection

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::supervisor::{WorkerCheck, WorkerSupervisor};

/// Spawn the watchdog loop.
///
/// Polls the supervisor every `watchdog_interval` until `shutdown` is
/// cancelled. Started once at process init.
pub fn spawn_watchdog(supervisor: Arc<WorkerSupervisor>, shutdown: CancellationToken) -> JoinHandle<()> {
    let period = supervisor.config().watchdog_interval();

    tokio::spawn(async move {
        info!(interval_ms = period.as_millis() as u64, "Worker watchdog started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match supervisor.check_worker().await {
                        WorkerCheck::Alive | WorkerCheck::Unsupervised => {},
                        check => debug!(?check, "Watchdog acted"),
                    }
                }
            }
        }

        info!("Worker watchdog stopped");
    })
}
