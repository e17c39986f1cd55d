//! Whole-catalog scans

use std::collections::HashSet;
use std::sync::Arc;

use rhapi_common::types::Item;
use tracing::{info, instrument, warn};

use super::batch::{BatchCoordinator, WindowResult};
use crate::index::IndexWriter;

/// Accumulated result of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub items: Vec<Item>,
    /// First version seen; fixed for the rest of the scan once set
    pub version: Option<String>,
    pub seen_ids: HashSet<String>,
    pub pages_scanned: u32,
    pub failed_pages: Vec<u32>,
    /// The scan ended on a fully exhausted window
    pub reached_end: bool,
    /// A `scan_until` predicate ended the scan early
    pub stopped_early: bool,
    /// The page ceiling ended the scan
    pub truncated: bool,
}

impl ScanResult {
    /// Every page up to the end of the catalog was served successfully
    pub fn is_complete(&self) -> bool {
        self.reached_end && self.failed_pages.is_empty() && !self.truncated
    }
}

/// Walks the catalog window by window until a window comes back exhausted
pub struct PaginationDriver {
    batch: Arc<BatchCoordinator>,
    window_size: u32,
    max_pages: u32,
    writer: Option<IndexWriter>,
}

impl PaginationDriver {
    pub fn new(batch: Arc<BatchCoordinator>, window_size: u32, max_pages: u32, writer: Option<IndexWriter>) -> Self {
        Self {
            batch,
            window_size: window_size.max(1),
            max_pages,
            writer,
        }
    }

    /// Scan the whole catalog.
    ///
    /// After a complete scan, index entries for ids that were not seen are
    /// scheduled for deletion.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> ScanResult {
        let scan = self.scan_until(|_| false).await;

        info!(
            items = scan.items.len(),
            pages = scan.pages_scanned,
            version = scan.version.as_deref().unwrap_or("-"),
            complete = scan.is_complete(),
            "Catalog scan finished"
        );

        if scan.is_complete() {
            if let Some(writer) = &self.writer {
                writer.reconcile(scan.seen_ids.clone());
            }
        } else if !scan.failed_pages.is_empty() {
            warn!(failed_pages = ?scan.failed_pages, "Scan incomplete; index reconciliation skipped");
        }

        scan
    }

    /// Scan until `stop` returns true for a window, or the catalog ends.
    ///
    /// The window that satisfied `stop` is included in the result.
    pub async fn scan_until<F>(&self, mut stop: F) -> ScanResult
    where
        F: FnMut(&WindowResult) -> bool,
    {
        let mut scan = ScanResult::default();
        let mut start = 0u32;

        loop {
            if start >= self.max_pages {
                warn!(max_pages = self.max_pages, "Scan reached the page ceiling");
                scan.truncated = true;
                break;
            }

            let size = self.window_size.min(self.max_pages - start);
            let window = self.batch.fetch_window(start, size).await;

            scan.pages_scanned += size;
            scan.failed_pages.extend_from_slice(&window.failed_pages);
            if scan.version.is_none() {
                scan.version.clone_from(&window.version);
            }

            let matched = stop(&window);
            let exhausted = window.exhausted;

            for item in window.items {
                scan.seen_ids.insert(item.id.clone());
                scan.items.push(item);
            }

            if matched {
                scan.stopped_early = true;
                break;
            }
            if exhausted {
                scan.reached_end = true;
                break;
            }

            start += size;
        }

        scan
    }
}
