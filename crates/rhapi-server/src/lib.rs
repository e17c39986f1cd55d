//! RHAPI Server Library
//!
//! HTTP front for a catalog served by a slow, paginated scraper worker.
//!
//! # Overview
//!
//! - **Worker supervision**: start the worker process, wait for its ready
//!   line, restart it after crashes up to a retry ceiling ([`worker`])
//! - **Catalog scans**: fetch pages in concurrent windows through a
//!   process-wide gate until a whole window comes back empty ([`catalog`])
//! - **Location index**: SQLite map of item id to last-seen page, so a single
//!   item costs one page fetch instead of a scan ([`index`])
//! - **HTTP API**: axum routes over the catalog ([`api`])
//!
//! # Architecture
//!
//! ```text
//! api ──► Catalog ──► PaginationDriver ──► BatchCoordinator ──► PageFetcher ──► worker
//!            │                                   │
//!            └──► LookupCoordinator ──► LocationIndex ◄── IndexWriter (write-back)
//!            │
//!            └──► WorkerSupervisor ◄── watchdog
//! ```
//!
//! Index writes never sit on the read path: windows hand their item
//! locations to the [`index::IndexWriter`] queue and return immediately.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rhapi_server::{catalog::{Catalog, HttpPageFetcher}, config::Config};
//! use rhapi_server::index::{IndexWriter, LocationIndex};
//! use rhapi_server::worker::WorkerSupervisor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let index = Arc::new(LocationIndex::open(&config.index.path, config.index.read_timeout()).await?);
//!     let (writer, _task) = IndexWriter::spawn(index.clone(), config.index.queue_capacity);
//!     let supervisor = Arc::new(WorkerSupervisor::new(config.worker.clone()));
//!     supervisor.start().await?;
//!
//!     let fetcher = HttpPageFetcher::new(config.worker.data_url.clone(), config.fetch.page_timeout())?;
//!     let catalog = Catalog::new(supervisor, Arc::new(fetcher), index, writer, &config.fetch);
//!     println!("{} items", catalog.list_all().await.items.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod middleware;
pub mod worker;

// Re-export commonly used types
pub use error::{AppError, CatalogError, CatalogResult, IndexError, SupervisorError};
