//! External worker supervision
//!
//! The worker is a long-lived child process that serves catalog pages over
//! HTTP. [`WorkerSupervisor`] owns its lifecycle; [`spawn_watchdog`] restarts
//! it after unexpected exits, up to `max_restarts` consecutive times.

pub mod state;
pub mod supervisor;
pub mod watchdog;

pub use state::{
    HealthStatus, WorkerFailure, WorkerHealth, WorkerReadiness, WorkerSnapshot, WorkerState,
};
pub use supervisor::{WorkerCheck, WorkerSupervisor};
pub use watchdog::spawn_watchdog;
