//! Catalog access
//!
//! [`Catalog`] is what the route layer talks to. It combines the worker
//! supervisor, the windowed page fetcher and the location index:
//!
//! - `list_all` walks every page until a whole window comes back empty
//! - `get_by_id` tries the indexed page first, then scans
//! - `restart_worker` and `health_snapshot` pass through to the supervisor
//!
//! A listing is `degraded` when the worker is not ready or the scan could not
//! visit every page. A lookup reports the item missing only after a complete
//! scan.

pub mod batch;
pub mod fetcher;
pub mod lookup;
pub mod pagination;

pub use batch::{BatchCoordinator, WindowResult};
pub use fetcher::{FetchFailure, FetchOutcome, HttpPageFetcher, PageFetcher};
pub use lookup::{LookupCoordinator, LookupOutcome};
pub use pagination::{PaginationDriver, ScanResult};

use std::sync::Arc;

use rhapi_common::types::Item;
use serde::Serialize;
use tracing::warn;

use crate::config::FetchConfig;
use crate::error::{CatalogError, CatalogResult, SupervisorError};
use crate::index::{IndexWriter, LocationIndex};
use crate::worker::{WorkerHealth, WorkerReadiness, WorkerSupervisor};

/// Whether a listing reflects the whole catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Ok,
    Degraded,
}

/// Result of [`Catalog::list_all`]
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub items: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: ListingStatus,
}

impl Listing {
    fn degraded() -> Self {
        Self {
            items: Vec::new(),
            version: None,
            status: ListingStatus::Degraded,
        }
    }
}

/// Result of [`Catalog::get_by_id`]
#[derive(Debug, Clone, Serialize)]
pub struct ItemLookup {
    pub item: Item,
    pub version: Option<String>,
}

pub struct Catalog {
    supervisor: Arc<WorkerSupervisor>,
    readiness: WorkerReadiness,
    driver: Arc<PaginationDriver>,
    lookup: LookupCoordinator,
}

impl Catalog {
    pub fn new(
        supervisor: Arc<WorkerSupervisor>,
        fetcher: Arc<dyn PageFetcher>,
        index: Arc<LocationIndex>,
        writer: IndexWriter,
        fetch: &FetchConfig,
    ) -> Self {
        let batch = Arc::new(BatchCoordinator::new(
            fetcher,
            fetch.window_size as usize,
            Some(writer.clone()),
        ));
        let driver = Arc::new(PaginationDriver::new(
            Arc::clone(&batch),
            fetch.window_size,
            fetch.max_pages,
            Some(writer.clone()),
        ));
        let lookup = LookupCoordinator::new(index, batch, Arc::clone(&driver), writer);

        Self {
            readiness: supervisor.readiness(),
            supervisor,
            driver,
            lookup,
        }
    }

    /// Every item in the catalog, or as many as could be fetched
    pub async fn list_all(&self) -> Listing {
        if !self.readiness.is_usable() {
            warn!(state = %self.readiness.describe(), "Listing requested while worker is not ready");
            return Listing::degraded();
        }

        let scan = self.driver.scan().await;
        let status = if scan.is_complete() {
            ListingStatus::Ok
        } else {
            ListingStatus::Degraded
        };

        Listing {
            items: scan.items,
            version: scan.version,
            status,
        }
    }

    pub async fn get_by_id(&self, item_id: &str) -> CatalogResult<ItemLookup> {
        if !self.readiness.is_usable() {
            return Err(CatalogError::WorkerUnavailable(format!(
                "worker is {}",
                self.readiness.describe()
            )));
        }

        match self.lookup.find(item_id).await {
            LookupOutcome::Found { item, version, .. } => Ok(ItemLookup { item, version }),
            LookupOutcome::NotFound => Err(CatalogError::NotFound(item_id.to_string())),
            LookupOutcome::Incomplete => Err(CatalogError::WorkerUnavailable(
                "catalog scan did not complete".to_string(),
            )),
        }
    }

    /// Manual worker restart; returns the new pid
    pub async fn restart_worker(&self) -> Result<u32, SupervisorError> {
        self.supervisor.restart().await
    }

    pub async fn health_snapshot(&self) -> WorkerHealth {
        self.supervisor.health_status().await
    }

    pub fn readiness(&self) -> &WorkerReadiness {
        &self.readiness
    }
}
