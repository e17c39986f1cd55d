//! Persistent item location index
//!
//! Maps each item id to the page it was last seen on, so a point lookup can
//! fetch one page instead of scanning the whole catalog. Stored in SQLite
//! (WAL mode) and shared by every request.
//!
//! Entries are hints. A stale or wrong entry costs one extra page fetch; it
//! never produces a wrong answer.

pub mod writer;

pub use writer::IndexWriter;

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use tracing::{debug, info, warn};

use crate::error::IndexError;

/// SQLite allows 999 bound variables per statement on older builds
const DELETE_CHUNK_SIZE: usize = 500;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One index row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct IndexEntry {
    pub item_id: String,
    pub page_number: i64,
    pub last_seen: DateTime<Utc>,
}

/// Item id → page number store
pub struct LocationIndex {
    pool: SqlitePool,
    read_timeout: Duration,
}

impl LocationIndex {
    /// Open (or create) the index file and apply migrations
    pub async fn open(path: &Path, read_timeout: Duration) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Location index opened");
        Self::from_pool(pool, read_timeout).await
    }

    /// Private in-memory index, for tests and throwaway runs
    pub async fn in_memory(read_timeout: Duration) -> Result<Self, IndexError> {
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool, read_timeout).await
    }

    async fn from_pool(pool: SqlitePool, read_timeout: Duration) -> Result<Self, IndexError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool, read_timeout })
    }

    /// Create or overwrite the entry for `item_id`
    pub async fn upsert(&self, item_id: &str, page_number: u32) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            INSERT INTO item_index (item_id, page_number, last_seen)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(item_id) DO UPDATE SET
                page_number = excluded.page_number,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(item_id)
        .bind(i64::from(page_number))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a batch of `(item_id, page_number)` pairs in one transaction
    pub async fn upsert_many(&self, entries: &[(String, u32)]) -> Result<usize, IndexError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (item_id, page_number) in entries {
            sqlx::query(
                r#"
                INSERT INTO item_index (item_id, page_number, last_seen)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(item_id) DO UPDATE SET
                    page_number = excluded.page_number,
                    last_seen = excluded.last_seen
                "#,
            )
            .bind(item_id)
            .bind(i64::from(*page_number))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(entries.len())
    }

    /// Page `item_id` was last seen on.
    ///
    /// Waits at most the configured read timeout. A timeout or store error is
    /// logged and reported as "not indexed".
    pub async fn lookup(&self, item_id: &str) -> Option<u32> {
        match tokio::time::timeout(self.read_timeout, self.entry(item_id)).await {
            Ok(Ok(entry)) => entry.and_then(|e| u32::try_from(e.page_number).ok()),
            Ok(Err(e)) => {
                warn!(item_id, error = %e, "Index lookup failed; treating as not indexed");
                None
            },
            Err(_) => {
                warn!(item_id, timeout_ms = self.read_timeout.as_millis() as u64, "Index lookup timed out");
                None
            },
        }
    }

    /// Full entry for `item_id`
    pub async fn entry(&self, item_id: &str) -> Result<Option<IndexEntry>, IndexError> {
        let entry = sqlx::query_as::<_, IndexEntry>(
            r#"
            SELECT item_id, page_number, last_seen FROM item_index WHERE item_id = ?1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Remove entries, returning how many existed
    pub async fn delete_many(&self, item_ids: &[String]) -> Result<u64, IndexError> {
        let mut deleted = 0;

        for chunk in item_ids.chunks(DELETE_CHUNK_SIZE) {
            let mut query = QueryBuilder::new("DELETE FROM item_index WHERE item_id IN (");
            let mut ids = query.separated(", ");
            for id in chunk {
                ids.push_bind(id);
            }
            ids.push_unseparated(")");

            deleted += query.build().execute(&self.pool).await?.rows_affected();
        }

        Ok(deleted)
    }

    /// Every entry, ordered by page then id
    pub async fn all_entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
        let entries = sqlx::query_as::<_, IndexEntry>(
            r#"
            SELECT item_id, page_number, last_seen FROM item_index
            ORDER BY page_number, item_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Reconciliation: delete every entry whose id is not in `seen`
    pub async fn retain_only(&self, seen: &HashSet<String>) -> Result<u64, IndexError> {
        let stale: Vec<String> = sqlx::query_scalar::<_, String>("SELECT item_id FROM item_index")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        debug!(stale = stale.len(), "Reconciling location index");
        self.delete_many(&stale).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
