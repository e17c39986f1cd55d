//! Concurrent window fetches

use std::sync::Arc;

use futures::future::join_all;
use rhapi_common::types::Item;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::fetcher::{FetchFailure, FetchOutcome, PageFetcher};
use crate::index::IndexWriter;

/// Aggregate of one window of pages
#[derive(Debug, Clone, Default)]
pub struct WindowResult {
    pub start: u32,
    pub size: u32,
    /// Items of every page in the window, in page order
    pub items: Vec<Item>,
    /// First non-null version in page order
    pub version: Option<String>,
    /// Every page in the window was exhausted
    pub exhausted: bool,
    /// Pages whose fetch failed (as opposed to being empty)
    pub failed_pages: Vec<u32>,
}

/// Fetches windows of consecutive pages through a process-wide gate.
///
/// The gate is shared by every caller, so the number of page requests in
/// flight never exceeds its permit count no matter how many scans and
/// lookups run at once.
pub struct BatchCoordinator {
    fetcher: Arc<dyn PageFetcher>,
    gate: Arc<Semaphore>,
    writer: Option<IndexWriter>,
}

impl BatchCoordinator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_in_flight: usize, writer: Option<IndexWriter>) -> Self {
        Self {
            fetcher,
            gate: Arc::new(Semaphore::new(max_in_flight)),
            writer,
        }
    }

    /// Fetch pages `[start, start + size)` concurrently and wait for all of
    /// them. Locations of returned items are handed to the index writer
    /// without waiting for the write.
    pub async fn fetch_window(&self, start: u32, size: u32) -> WindowResult {
        let end = start.saturating_add(size);

        let tasks = (start..end).map(|page| {
            let fetcher = Arc::clone(&self.fetcher);
            let gate = Arc::clone(&self.gate);
            tokio::spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return FetchOutcome::failed(page, FetchFailure::Transport);
                };
                fetcher.fetch_page(page).await
            })
        });

        let outcomes: Vec<FetchOutcome> = join_all(tasks)
            .await
            .into_iter()
            .zip(start..end)
            .map(|(joined, page)| {
                joined.unwrap_or_else(|e| {
                    warn!(page, error = %e, "Page fetch task failed");
                    FetchOutcome::failed(page, FetchFailure::Transport)
                })
            })
            .collect();

        let result = self.aggregate(start, size, outcomes);
        debug!(
            start,
            size,
            items = result.items.len(),
            exhausted = result.exhausted,
            failed = result.failed_pages.len(),
            "Window fetched"
        );
        result
    }

    fn aggregate(&self, start: u32, size: u32, outcomes: Vec<FetchOutcome>) -> WindowResult {
        let mut result = WindowResult {
            start,
            size,
            exhausted: true,
            ..WindowResult::default()
        };
        let mut locations = Vec::new();

        for outcome in outcomes {
            if !outcome.exhausted {
                result.exhausted = false;
            }
            if outcome.is_failed() {
                result.failed_pages.push(outcome.page);
            }
            if result.version.is_none() {
                result.version = outcome.version;
            }
            for item in outcome.items {
                locations.push((item.id.clone(), outcome.page));
                result.items.push(item);
            }
        }

        if let Some(writer) = &self.writer {
            writer.record(locations);
        }

        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::index::LocationIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves fixed pages and records the peak number of concurrent fetches
    #[derive(Default)]
    struct ScriptedFetcher {
        pages: HashMap<u32, FetchOutcome>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn with_items(pages: u32, per_page: u32) -> Self {
            let mut fetcher = Self::default();
            for page in 0..pages {
                let items = (0..per_page)
                    .map(|i| Item::new(format!("p{page}-{i}"), format!("Item {i}")))
                    .collect();
                fetcher
                    .pages
                    .insert(page, FetchOutcome::served(page, items, Some("v1".into())));
            }
            fetcher
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(&self, page: u32) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.pages
                .get(&page)
                .cloned()
                .unwrap_or_else(|| FetchOutcome::served(page, Vec::new(), None))
        }
    }

    #[tokio::test]
    async fn test_window_preserves_page_order() {
        let fetcher = Arc::new(ScriptedFetcher::with_items(3, 2));
        let batch = BatchCoordinator::new(fetcher, 5, None);

        let window = batch.fetch_window(0, 5).await;
        let ids: Vec<&str> = window.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["p0-0", "p0-1", "p1-0", "p1-1", "p2-0", "p2-1"]);
        assert!(!window.exhausted);
        assert_eq!(window.version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_window_exhausted_only_when_every_page_is() {
        let mut fetcher = ScriptedFetcher::default();
        fetcher
            .pages
            .insert(3, FetchOutcome::served(3, vec![Item::new("late", "Late")], None));
        let batch = BatchCoordinator::new(Arc::new(fetcher), 5, None);

        assert!(!batch.fetch_window(0, 5).await.exhausted);
        assert!(batch.fetch_window(5, 5).await.exhausted);
    }

    #[tokio::test]
    async fn test_version_is_first_non_null_in_page_order() {
        let mut fetcher = ScriptedFetcher::default();
        fetcher.pages.insert(1, FetchOutcome::served(1, vec![Item::new("a", "A")], Some("v-first".into())));
        fetcher.pages.insert(2, FetchOutcome::served(2, vec![Item::new("b", "B")], Some("v-second".into())));
        let batch = BatchCoordinator::new(Arc::new(fetcher), 5, None);

        assert_eq!(batch.fetch_window(0, 3).await.version.as_deref(), Some("v-first"));
    }

    #[tokio::test]
    async fn test_failed_pages_are_reported() {
        let mut fetcher = ScriptedFetcher::default();
        fetcher.pages.insert(0, FetchOutcome::failed(0, FetchFailure::Timeout));
        let batch = BatchCoordinator::new(Arc::new(fetcher), 5, None);

        let window = batch.fetch_window(0, 3).await;
        assert!(window.exhausted);
        assert_eq!(window.failed_pages, vec![0]);
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_global() {
        let fetcher = Arc::new(ScriptedFetcher::with_items(50, 1));
        let batch = Arc::new(BatchCoordinator::new(fetcher.clone(), 5, None));

        // Two callers walking 50 pages each, 10 pages per window
        let mut callers = Vec::new();
        for _ in 0..2 {
            let batch = Arc::clone(&batch);
            callers.push(tokio::spawn(async move {
                for start in (0..50).step_by(10) {
                    batch.fetch_window(start, 10).await;
                }
            }));
        }
        for caller in callers {
            caller.await.unwrap();
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 100);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 5);
        assert!(fetcher.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_write_back_records_locations() {
        let index = Arc::new(LocationIndex::in_memory(Duration::from_millis(500)).await.unwrap());
        let (writer, _handle) = IndexWriter::spawn(index.clone(), 8);
        let batch = BatchCoordinator::new(Arc::new(ScriptedFetcher::with_items(2, 1)), 5, Some(writer.clone()));

        batch.fetch_window(0, 5).await;
        writer.flush().await;

        assert_eq!(index.lookup("p0-0").await, Some(0));
        assert_eq!(index.lookup("p1-0").await, Some(1));
    }
}
