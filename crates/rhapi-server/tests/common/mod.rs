//! Shared helpers for RHAPI server integration tests
//!
//! - [`FakeWorker`]: a `wiremock` server answering `GET /traderie?page=N`
//! - in-memory location index plus writer
//! - `sh` scripts standing in for the worker process (unix only)

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rhapi_common::types::{Item, PagePayload};
use rhapi_server::catalog::{BatchCoordinator, HttpPageFetcher, LookupCoordinator, PaginationDriver};
use rhapi_server::config::WorkerConfig;
use rhapi_server::index::{IndexWriter, LocationIndex};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WINDOW: u32 = 5;

/// Fake worker HTTP interface
pub struct FakeWorker {
    pub server: MockServer,
}

impl FakeWorker {
    /// Serve `pages` in order; every other page is empty
    pub async fn with_pages(pages: &[Vec<Item>], version: Option<&str>) -> Self {
        let server = MockServer::start().await;

        for (page, items) in pages.iter().enumerate() {
            Mock::given(method("GET"))
                .and(path("/traderie"))
                .and(query_param("page", page.to_string()))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(PagePayload::from_items(items, version)),
                )
                .mount(&server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/traderie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(PagePayload::default()))
            .with_priority(10)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Make pages `>= from` answer 500, as when the worker dies mid-scan
    pub async fn fail_from(&self, from: u32, upto: u32) {
        for page in from..upto {
            Mock::given(method("GET"))
                .and(path("/traderie"))
                .and(query_param("page", page.to_string()))
                .respond_with(ResponseTemplate::new(500))
                .with_priority(1)
                .mount(&self.server)
                .await;
        }
    }

    pub fn data_url(&self) -> String {
        format!("{}/traderie", self.server.uri())
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.server.uri())
    }

    /// Page numbers requested so far, in arrival order
    pub async fn requested_pages(&self) -> Vec<u32> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == "/traderie")
            .filter_map(|request| {
                request
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "page")
                    .and_then(|(_, value)| value.parse().ok())
            })
            .collect()
    }
}

/// `pages` pages of `per_page` items with ids `p{page}-{n}`
pub fn catalog(pages: u32, per_page: u32) -> Vec<Vec<Item>> {
    (0..pages)
        .map(|page| {
            (0..per_page)
                .map(|n| Item::new(format!("p{page}-{n}"), format!("Item {page}/{n}")))
                .collect()
        })
        .collect()
}

pub async fn memory_index() -> (Arc<LocationIndex>, IndexWriter) {
    let index = Arc::new(LocationIndex::in_memory(Duration::from_millis(500)).await.unwrap());
    let (writer, _task) = IndexWriter::spawn(Arc::clone(&index), 64);
    (index, writer)
}

/// Scan and lookup components wired against `worker`
pub struct Components {
    pub index: Arc<LocationIndex>,
    pub writer: IndexWriter,
    pub driver: Arc<PaginationDriver>,
    pub lookup: LookupCoordinator,
}

pub async fn components(worker: &FakeWorker) -> Components {
    let (index, writer) = memory_index().await;
    let fetcher = HttpPageFetcher::new(worker.data_url(), Duration::from_secs(2)).unwrap();
    let batch = Arc::new(BatchCoordinator::new(
        Arc::new(fetcher),
        WINDOW as usize,
        Some(writer.clone()),
    ));
    let driver = Arc::new(PaginationDriver::new(
        Arc::clone(&batch),
        WINDOW,
        10_000,
        Some(writer.clone()),
    ));
    let lookup = LookupCoordinator::new(Arc::clone(&index), batch, Arc::clone(&driver), writer.clone());

    Components {
        index,
        writer,
        driver,
        lookup,
    }
}

/// Write a worker script into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let script = dir.join(name);
    std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    script
}

/// Worker config running `sh <script> <extra args>`
pub fn script_worker(script: &Path, extra_args: &[&str]) -> WorkerConfig {
    let mut args = vec![script.display().to_string()];
    args.extend(extra_args.iter().map(|arg| arg.to_string()));

    WorkerConfig {
        command: "sh".to_string(),
        args,
        start_timeout_secs: 3,
        stop_grace_secs: 2,
        restart_grace_secs: 2,
        watchdog_interval_ms: 50,
        health_url: "http://127.0.0.1:9/health".to_string(),
        health_probe_timeout_ms: 300,
        ..WorkerConfig::default()
    }
}

/// Script that signals ready and then stays up
pub fn long_running_worker(dir: &TempDir) -> PathBuf {
    write_script(dir.path(), "worker.sh", "echo booting\necho NODE_READY\nexec sleep 30")
}

/// Number of lines in a spawn-counter file
pub fn spawn_count(counter: &Path) -> usize {
    std::fs::read_to_string(counter)
        .map(|content| content.lines().count())
        .unwrap_or(0)
}
