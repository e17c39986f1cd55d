//! Single-writer queue for index mutations
//!
//! Batch write-backs, reconciliation and miss deletions are all enqueued
//! here and applied in order by one background task. Enqueueing never waits:
//! when the queue is full the batch is dropped and the index stays one
//! generation stale.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::LocationIndex;

enum IndexCommand {
    Record(Vec<(String, u32)>),
    Remove(Vec<String>),
    Reconcile(HashSet<String>),
    Flush(oneshot::Sender<()>),
}

impl IndexCommand {
    fn kind(&self) -> &'static str {
        match self {
            IndexCommand::Record(_) => "record",
            IndexCommand::Remove(_) => "remove",
            IndexCommand::Reconcile(_) => "reconcile",
            IndexCommand::Flush(_) => "flush",
        }
    }
}

/// Handle to the index writer task
#[derive(Clone)]
pub struct IndexWriter {
    tx: mpsc::Sender<IndexCommand>,
}

impl IndexWriter {
    /// Spawn the writer task. It runs until every handle is dropped.
    pub fn spawn(index: Arc<LocationIndex>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_writer(index, rx));
        (Self { tx }, handle)
    }

    /// Schedule an upsert of `(item_id, page_number)` pairs
    pub fn record(&self, entries: Vec<(String, u32)>) {
        if !entries.is_empty() {
            self.enqueue(IndexCommand::Record(entries));
        }
    }

    /// Schedule deletion of the given ids
    pub fn remove(&self, item_ids: Vec<String>) {
        if !item_ids.is_empty() {
            self.enqueue(IndexCommand::Remove(item_ids));
        }
    }

    /// Schedule deletion of every entry not in `seen`
    pub fn reconcile(&self, seen: HashSet<String>) {
        self.enqueue(IndexCommand::Reconcile(seen));
    }

    /// Wait until everything enqueued before this call has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(IndexCommand::Flush(done_tx)).await.is_err() {
            warn!("Index writer stopped; nothing to flush");
            return;
        }
        let _ = done_rx.await;
    }

    fn enqueue(&self, command: IndexCommand) {
        let kind = command.kind();
        match self.tx.try_send(command) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind, "Index write queue full; dropping batch");
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind, "Index writer stopped; dropping batch");
            },
        }
    }
}

async fn run_writer(index: Arc<LocationIndex>, mut rx: mpsc::Receiver<IndexCommand>) {
    debug!("Index writer started");

    while let Some(command) = rx.recv().await {
        match command {
            IndexCommand::Record(entries) => match index.upsert_many(&entries).await {
                Ok(count) => debug!(count, "Index entries recorded"),
                Err(e) => warn!(count = entries.len(), error = %e, "Index write-back failed"),
            },
            IndexCommand::Remove(ids) => match index.delete_many(&ids).await {
                Ok(deleted) => debug!(deleted, "Index entries removed"),
                Err(e) => warn!(count = ids.len(), error = %e, "Index delete failed"),
            },
            IndexCommand::Reconcile(seen) => match index.retain_only(&seen).await {
                Ok(deleted) => info!(deleted, kept = seen.len(), "Location index reconciled"),
                Err(e) => warn!(error = %e, "Index reconciliation failed"),
            },
            IndexCommand::Flush(done) => {
                let _ = done.send(());
            },
        }
    }

    debug!("Index writer stopped");
}
