//! SQLite-backed implementation of the tracker store and embedding cache.
//!
//! One database file holds both tables:
//!
//! ```sql
//! -- Incremental tracker: one row per fully indexed file
//! CREATE TABLE files (
//!     path TEXT PRIMARY KEY,           -- absolute file path
//!     size INTEGER,                    -- size at index time
//!     mtime INTEGER,                   -- unix mtime at index time
//!     chunk_count INTEGER,             -- documents uploaded last time
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Embedding cache: fingerprint -> vector
//! CREATE TABLE embedding_cache (
//!     fingerprint TEXT PRIMARY KEY,    -- blake3 of normalized text + model id
//!     dimension INTEGER,
//!     embedding BLOB,                  -- little-endian f32 bytes
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```
//!
//! WAL mode and a busy timeout keep concurrent workers from tripping over
//! each other; all writes are single-statement upserts, so they are atomic
//! per path / per fingerprint.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{EmbeddingCache, FileRecord, TrackerStore};

/// Shared handle to the indexing state database.
#[derive(Clone, Debug)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (or create) the state database at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory state database for testing.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache (
                fingerprint TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TrackerStore for StateStore {
    async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT path, size, mtime, chunk_count FROM files WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| FileRecord {
            path: row.get("path"),
            size: row.get("size"),
            mtime: row.get("mtime"),
            chunk_count: row.get("chunk_count"),
        }))
    }

    async fn should_process(&self, path: &str, size: i64, mtime: i64) -> Result<bool> {
        match TrackerStore::get(self, path).await? {
            Some(record) => Ok(record.size != size || record.mtime != mtime),
            None => Ok(true),
        }
    }

    async fn record_success(&self, record: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (path, size, mtime, chunk_count, indexed_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime = excluded.mtime,
                chunk_count = excluded.chunk_count,
                indexed_at = datetime('now')
            "#,
        )
        .bind(&record.path)
        .bind(record.size)
        .bind(record.mtime)
        .bind(record.chunk_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        sqlx::query("DELETE FROM files").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EmbeddingCache for StateStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query("SELECT embedding FROM embedding_cache WHERE fingerprint = ?1")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let bytes: Vec<u8> = row.get("embedding");
            bytemuck::pod_collect_to_vec::<u8, f32>(&bytes)
        }))
    }

    async fn put(&self, fingerprint: &str, embedding: &[f32]) -> Result<()> {
        let bytes = bytemuck::cast_slice::<f32, u8>(embedding);
        sqlx::query(
            r#"
            INSERT INTO embedding_cache (fingerprint, dimension, embedding)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(fingerprint) DO NOTHING
            "#,
        )
        .bind(fingerprint)
        .bind(embedding.len() as i64)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM embedding_cache")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn entry_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
