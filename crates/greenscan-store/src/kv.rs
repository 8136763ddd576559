//! SQLite implementation of IKeyValueStore
//!
//! One `kv_blobs` table, one row per logical snapshot. `set` is a single
//! UPSERT statement, which gives the all-or-nothing write the snapshot
//! persistence model requires: either the whole new document replaces the
//! old one, or the old one stays intact.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use greenscan_core::ports::IKeyValueStore;

use crate::StoreError;

/// SQLite-backed implementation of the key-value store port
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_blobs WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO kv_blobs (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM kv_blobs WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(())
    }
}
