//! Logging initialisation
//!
//! All RHAPI binaries log through `tracing`. This module builds the global
//! subscriber: a console layer, an optional daily rolling file layer, and an
//! `EnvFilter` assembled from configuration.
//!
//! Use structured fields rather than formatted strings where a value is
//! worth searching for:
//!
//! ```rust
//! use tracing::warn;
//!
//! let page = 3;
//! warn!(page, reason = "timeout", "Page fetch failed");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rhapi_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::new("info,rhapi_server=debug", "rhapi-server").with_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Invalid log format: {}", other)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info,sqlx=warn`
    pub filter: String,

    pub format: LogFormat,

    /// When set, logs are also written to a daily rolling file in this directory
    pub log_dir: Option<PathBuf>,

    /// File name prefix for rolled files (`<prefix>.YYYY-MM-DD`)
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
            log_dir: None,
            file_prefix: "rhapi".to_string(),
        }
    }
}

impl LogConfig {
    pub fn new(filter: impl Into<String>, file_prefix: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            file_prefix: file_prefix.into(),
            ..Self::default()
        }
    }

    /// Apply environment overrides.
    ///
    /// - `RHAPI_LOG`: filter directives (replaces the configured filter)
    /// - `RHAPI_LOG_FORMAT`: `text` or `json`
    /// - `RHAPI_LOG_DIR`: enables the rolling file output
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(filter) = std::env::var("RHAPI_LOG") {
            self.filter = filter;
        }

        if let Ok(format) = std::env::var("RHAPI_LOG_FORMAT") {
            self.format = format.parse()?;
        }

        if let Ok(dir) = std::env::var("RHAPI_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.log_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(self)
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi).with_target(true);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file output is enabled; keep it alive
/// for the lifetime of the process or buffered lines are lost on exit.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.filter)
        .with_context(|| format!("Invalid log filter '{}'", config.filter))?;

    let mut layers: Vec<BoxedLayer> = vec![format_layer(config.format, std::io::stdout, true)];

    let guard = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(config.format, writer, false));
            Some(guard)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(guard)
}
