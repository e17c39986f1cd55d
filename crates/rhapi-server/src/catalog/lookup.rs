//! Single-item lookups through the location index

use std::sync::Arc;

use rhapi_common::types::Item;
use tracing::{debug, info, instrument};

use super::batch::BatchCoordinator;
use super::pagination::PaginationDriver;
use crate::index::{IndexWriter, LocationIndex};

/// How a lookup ended
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found {
        item: Item,
        version: Option<String>,
        /// The indexed page still held the item
        index_hit: bool,
    },
    /// The item is not in a completely scanned catalog
    NotFound,
    /// The fallback scan failed part way; absence is unknown
    Incomplete,
}

/// Finds one item, trying its indexed page before scanning
pub struct LookupCoordinator {
    index: Arc<LocationIndex>,
    batch: Arc<BatchCoordinator>,
    driver: Arc<PaginationDriver>,
    writer: IndexWriter,
}

impl LookupCoordinator {
    pub fn new(
        index: Arc<LocationIndex>,
        batch: Arc<BatchCoordinator>,
        driver: Arc<PaginationDriver>,
        writer: IndexWriter,
    ) -> Self {
        Self {
            index,
            batch,
            driver,
            writer,
        }
    }

    #[instrument(skip(self))]
    pub async fn find(&self, item_id: &str) -> LookupOutcome {
        if let Some(page) = self.index.lookup(item_id).await {
            let window = self.batch.fetch_window(page, 1).await;
            if let Some(item) = window.items.into_iter().find(|item| item.id == item_id) {
                debug!(item_id, page, "Index hit");
                return LookupOutcome::Found {
                    item,
                    version: window.version,
                    index_hit: true,
                };
            }
            info!(item_id, page, "Indexed page no longer holds item; scanning");
        }

        let scan = self
            .driver
            .scan_until(|window| window.items.iter().any(|item| item.id == item_id))
            .await;

        if let Some(item) = scan.items.iter().find(|item| item.id == item_id) {
            return LookupOutcome::Found {
                item: item.clone(),
                version: scan.version,
                index_hit: false,
            };
        }

        if scan.is_complete() {
            info!(item_id, "Item not in catalog; dropping index entry");
            self.writer.remove(vec![item_id.to_string()]);
            LookupOutcome::NotFound
        } else {
            LookupOutcome::Incomplete
        }
    }
}
