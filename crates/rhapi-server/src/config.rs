//! Configuration management
//!
//! Values are layered, lowest precedence first:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. Optional TOML file (`rhapi.toml` unless overridden)
//! 3. `RHAPI_`-prefixed environment variables, `__` separating sections
//!    (`RHAPI_FETCH__WINDOW_SIZE=8`, `RHAPI_WORKER__MAX_RESTARTS=5`)
//! 4. Deployment overrides: `PORT` binds `0.0.0.0:$PORT`, `API_KEY` sets the
//!    restart key

use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 5000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Worker Configuration Constants
// ============================================================================

/// Default worker program.
pub const DEFAULT_WORKER_COMMAND: &str = "node";

/// Default worker script argument.
pub const DEFAULT_WORKER_SCRIPT: &str = "fetchData.js";

/// Line the worker prints on stdout once it is listening.
pub const DEFAULT_READY_LINE: &str = "NODE_READY";

/// Default worker page endpoint.
pub const DEFAULT_DATA_URL: &str = "http://localhost:3001/traderie";

/// Default worker health endpoint.
pub const DEFAULT_HEALTH_URL: &str = "http://localhost:3001/health";

/// Time allowed for the worker to print its ready line.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 15;

/// Grace period between SIGTERM and a hard kill on shutdown.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;

/// Grace period for the old worker during a manual restart.
pub const DEFAULT_RESTART_GRACE_SECS: u64 = 5;

/// Watchdog poll interval.
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 2_000;

/// Consecutive automatic restarts before supervision gives up.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Timeout for the worker health probe.
pub const DEFAULT_HEALTH_PROBE_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Fetch / Index Configuration Constants
// ============================================================================

/// Pages fetched concurrently per window (also the global in-flight cap).
pub const DEFAULT_WINDOW_SIZE: u32 = 5;

/// Per-page request timeout in seconds.
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 30;

/// Safety ceiling on pages visited by one scan.
pub const DEFAULT_MAX_PAGES: u32 = 10_000;

/// Default SQLite file for the location index.
pub const DEFAULT_INDEX_PATH: &str = "item_index.db";

/// Longest a point lookup waits on the index before reporting "not indexed".
pub const DEFAULT_INDEX_READ_TIMEOUT_MS: u64 = 500;

/// Pending index write batches held before new ones are dropped.
pub const DEFAULT_INDEX_QUEUE_CAPACITY: usize = 256;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "rhapi.toml";

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Worker process and endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Program to execute
    pub command: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory for the worker (inherits ours when unset)
    pub working_dir: Option<PathBuf>,
    /// Exact stdout line that signals readiness
    pub ready_line: String,
    pub data_url: String,
    pub health_url: String,
    pub start_timeout_secs: u64,
    pub stop_grace_secs: u64,
    pub restart_grace_secs: u64,
    pub watchdog_interval_ms: u64,
    pub max_restarts: u32,
    pub health_probe_timeout_ms: u64,
}

/// Page retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub window_size: u32,
    pub page_timeout_secs: u64,
    pub max_pages: u32,
}

/// Location index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub read_timeout_ms: u64,
    pub queue_capacity: usize,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// API key protecting administrative routes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_WORKER_COMMAND.to_string(),
            args: vec![DEFAULT_WORKER_SCRIPT.to_string()],
            working_dir: None,
            ready_line: DEFAULT_READY_LINE.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            health_url: DEFAULT_HEALTH_URL.to_string(),
            start_timeout_secs: DEFAULT_START_TIMEOUT_SECS,
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
            restart_grace_secs: DEFAULT_RESTART_GRACE_SECS,
            watchdog_interval_ms: DEFAULT_WATCHDOG_INTERVAL_MS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            health_probe_timeout_ms: DEFAULT_HEALTH_PROBE_TIMEOUT_MS,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            page_timeout_secs: DEFAULT_PAGE_TIMEOUT_SECS,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_INDEX_PATH),
            read_timeout_ms: DEFAULT_INDEX_READ_TIMEOUT_MS,
            queue_capacity: DEFAULT_INDEX_QUEUE_CAPACITY,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
        }
    }
}

impl WorkerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn health_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health_probe_timeout_ms)
    }
}

impl FetchConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

impl IndexConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Config {
    /// Load configuration from `.env`, the optional TOML file, and the environment
    pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let file = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if config_file.is_some() && !file.exists() {
            anyhow::bail!("Configuration file '{}' does not exist", file.display());
        }

        let mut config: Config = Self::figment(file)
            .extract()
            .context("Failed to assemble configuration")?;

        config.apply_deployment_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Figment stack used by [`Config::load`], without `.env` or deployment overrides
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("RHAPI_").split("__"))
    }

    fn apply_deployment_overrides(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            tracing::info!(port, "Using 0.0.0.0 with PORT from environment");
            self.server.host = "0.0.0.0".to_string();
            self.server.port = port;
        }

        if let Ok(key) = std::env::var("API_KEY") {
            if !key.is_empty() {
                self.auth.api_key = Some(key);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.worker.command.trim().is_empty() {
            anyhow::bail!("Worker command cannot be empty");
        }

        if self.worker.ready_line.trim().is_empty() {
            anyhow::bail!("Worker ready line cannot be empty");
        }

        if self.fetch.window_size == 0 {
            anyhow::bail!("Fetch window_size must be greater than 0");
        }

        if self.fetch.page_timeout_secs == 0 || self.worker.start_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.worker.watchdog_interval_ms == 0 {
            anyhow::bail!("Watchdog interval must be greater than 0");
        }

        if self.index.queue_capacity == 0 {
            anyhow::bail!("Index queue_capacity must be greater than 0");
        }

        reqwest::Url::parse(&self.worker.data_url)
            .with_context(|| format!("Invalid worker data_url '{}'", self.worker.data_url))?;
        reqwest::Url::parse(&self.worker.health_url)
            .with_context(|| format!("Invalid worker health_url '{}'", self.worker.health_url))?;

        if self.auth.api_key.is_none() {
            tracing::warn!("No API key configured - worker restart endpoint is disabled");
        }

        Ok(())
    }
}
