//! Scan, index and lookup behaviour against a fake worker
//!
//! These tests cover:
//! - End-of-catalog detection and page accounting
//! - Index write-back and reconciliation after complete scans
//! - Partial results when the worker fails mid-scan
//! - The one-fetch fast path, stale-entry fallback and misses

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{catalog, components, FakeWorker};
use rhapi_common::types::Item;
use rhapi_server::catalog::LookupOutcome;

#[tokio::test]
async fn test_scan_collects_every_page_and_indexes_it() {
    let worker = FakeWorker::with_pages(&catalog(12, 2), Some("gen-1")).await;
    let parts = components(&worker).await;

    let scan = parts.driver.scan().await;
    parts.writer.flush().await;

    assert!(scan.is_complete());
    assert_eq!(scan.items.len(), 24);
    assert_eq!(scan.version.as_deref(), Some("gen-1"));
    assert_eq!(scan.items[0].id, "p0-0");
    assert_eq!(scan.items[23].id, "p11-1");

    // three windows with items, then one empty window
    let mut pages = worker.requested_pages().await;
    pages.sort_unstable();
    assert_eq!(pages, (0..20).collect::<Vec<u32>>());

    let entries = parts.index.all_entries().await.unwrap();
    assert_eq!(entries.len(), 24);
    assert_eq!(parts.index.lookup("p7-1").await, Some(7));
}

#[tokio::test]
async fn test_repeated_scans_are_identical() {
    let worker = FakeWorker::with_pages(&catalog(7, 3), Some("gen-2")).await;
    let parts = components(&worker).await;

    let first = parts.driver.scan().await;
    let second = parts.driver.scan().await;

    assert_eq!(first.items, second.items);
    assert_eq!(first.version, second.version);
    assert_eq!(first.seen_ids, second.seen_ids);
}

#[tokio::test]
async fn test_complete_scan_reconciles_stale_entries() {
    let worker = FakeWorker::with_pages(&catalog(3, 1), None).await;
    let parts = components(&worker).await;
    parts.index.upsert("sold-out", 2).await.unwrap();

    parts.driver.scan().await;
    parts.writer.flush().await;

    let ids: Vec<String> = parts
        .index
        .all_entries()
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.item_id)
        .collect();
    assert_eq!(ids, vec!["p0-0", "p1-0", "p2-0"]);
}

#[tokio::test]
async fn test_worker_crash_mid_scan_returns_partial_result() {
    let worker = FakeWorker::with_pages(&catalog(20, 1), Some("gen-3")).await;
    worker.fail_from(7, 20).await;
    let parts = components(&worker).await;
    parts.index.upsert("p15-0", 15).await.unwrap();

    let scan = parts.driver.scan().await;
    parts.writer.flush().await;

    // window [5, 10) still has pages 5 and 6; window [10, 15) is all failures
    assert_eq!(scan.items.len(), 7);
    assert!(!scan.is_complete());
    assert_eq!(scan.failed_pages.len(), 8);

    // no reconciliation after an incomplete scan
    assert_eq!(parts.index.lookup("p15-0").await, Some(15));
}

#[tokio::test]
async fn test_empty_catalog() {
    let worker = FakeWorker::with_pages(&[], None).await;
    let parts = components(&worker).await;

    let scan = parts.driver.scan().await;
    assert!(scan.items.is_empty());
    assert!(scan.version.is_none());
    assert!(scan.is_complete());
    assert_eq!(worker.requested_pages().await.len(), 5);
}

#[tokio::test]
async fn test_indexed_lookup_costs_one_page_fetch() {
    let worker = FakeWorker::with_pages(&catalog(10, 2), Some("gen-4")).await;
    let parts = components(&worker).await;
    parts.index.upsert("p3-1", 3).await.unwrap();

    let outcome = parts.lookup.find("p3-1").await;

    match outcome {
        LookupOutcome::Found {
            item,
            version,
            index_hit,
        } => {
            assert_eq!(item.id, "p3-1");
            assert_eq!(version.as_deref(), Some("gen-4"));
            assert!(index_hit);
        },
        other => panic!("expected a hit, got {other:?}"),
    }
    assert_eq!(worker.requested_pages().await, vec![3]);
}

#[tokio::test]
async fn test_stale_index_entry_falls_back_and_is_corrected() {
    let mut pages = catalog(10, 1);
    pages[8].push(Item::new("moved", "Moved item"));
    let worker = FakeWorker::with_pages(&pages, None).await;
    let parts = components(&worker).await;
    parts.index.upsert("moved", 1).await.unwrap();

    let outcome = parts.lookup.find("moved").await;
    parts.writer.flush().await;

    match outcome {
        LookupOutcome::Found { item, index_hit, .. } => {
            assert_eq!(item.id, "moved");
            assert!(!index_hit);
        },
        other => panic!("expected the item, got {other:?}"),
    }
    assert_eq!(parts.index.lookup("moved").await, Some(8));

    // page 1 for the stale hint, then windows [0, 5) and [5, 10)
    assert_eq!(worker.requested_pages().await.len(), 11);
}

#[tokio::test]
async fn test_lookup_miss_removes_index_entry() {
    let worker = FakeWorker::with_pages(&catalog(4, 2), None).await;
    let parts = components(&worker).await;
    parts.index.upsert("gone", 2).await.unwrap();

    let outcome = parts.lookup.find("gone").await;
    parts.writer.flush().await;

    assert_eq!(outcome, LookupOutcome::NotFound);
    assert_eq!(parts.index.lookup("gone").await, None);
}

#[tokio::test]
async fn test_lookup_miss_on_incomplete_scan_keeps_entry() {
    let worker = FakeWorker::with_pages(&catalog(12, 1), None).await;
    worker.fail_from(3, 12).await;
    let parts = components(&worker).await;
    parts.index.upsert("maybe", 9).await.unwrap();

    let outcome = parts.lookup.find("maybe").await;
    parts.writer.flush().await;

    assert_eq!(outcome, LookupOutcome::Incomplete);
    assert_eq!(parts.index.lookup("maybe").await, Some(9));
}
