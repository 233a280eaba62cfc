//! SQLite-backed document store.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::debug;

use super::DocumentStore;

/// Stores every document as a JSON row of a single `documents` table.
///
/// `database` plays the role of the store's database name so several jobs can
/// share one file without mixing their collections.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    database: String,
}

impl SqliteStore {
    /// Open (creating if needed) the SQLite file named by `uri` and ensure the schema.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(uri)
            .map_err(|e| StoreError::Connection(format!("failed to parse database URI: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // Inserts are strictly sequential within a run.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            pool,
            database: database.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                database TEXT NOT NULL,
                collection TEXT NOT NULL,
                body TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents(database, collection)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_value(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(&document)?;
        let result = sqlx::query(
            r#"
            INSERT INTO documents (database, collection, body, inserted_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&self.database)
        .bind(collection)
        .bind(&body)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!(collection, id = result.last_insert_rowid(), "Inserted document");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
