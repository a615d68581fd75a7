// src/store.rs
//! Durable retention store for canonical items. Append/delete only, no
//! update-in-place, no uniqueness constraint: repeated polls of an
//! unchanged feed re-insert the same logical item and TTL eviction bounds
//! growth. Pull and push processes may share the same database file.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::parser::FeedItem;

/// A stored row. `published_at` is not persisted; `created_at` is the
/// ingestion epoch time assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredItem {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    pub created_at: i64,
}

impl From<StoredItem> for FeedItem {
    fn from(row: StoredItem) -> Self {
        FeedItem {
            title: row.title,
            link: row.link,
            summary: row.summary,
            published_at: String::new(),
            source: row.source,
        }
    }
}

pub struct RetentionStore {
    pool: SqlitePool,
}

impl RetentionStore {
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::init(pool).await
    }

    /// Private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        // One connection only: every `sqlite::memory:` connection is its
        // own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS news_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                summary TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Append a batch atomically; every row gets `created_at = now`.
    pub async fn insert(&self, items: &[FeedItem]) -> Result<u64, sqlx::Error> {
        if items.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO news_items (title, link, summary, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&item.title)
            .bind(&item.link)
            .bind(&item.summary)
            .bind(&item.source)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(items.len() as u64)
    }

    /// Up to `limit` rows in insertion order, oldest first. Non-destructive:
    /// rows stay until they expire. A non-positive limit yields no rows
    /// (SQLite would treat a negative LIMIT as unlimited).
    pub async fn retrieve(&self, limit: i64) -> Result<Vec<StoredItem>, sqlx::Error> {
        let limit = limit.max(0);
        sqlx::query_as::<_, StoredItem>(
            "SELECT id, title, link, summary, source, created_at
             FROM news_items ORDER BY id ASC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete rows ingested more than `ttl` ago; returns the count removed.
    pub async fn evict_expired(&self, ttl: Duration) -> Result<u64, sqlx::Error> {
        let cutoff = chrono::Utc::now().timestamp() - ttl.as_secs() as i64;
        let result = sqlx::query("DELETE FROM news_items WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
