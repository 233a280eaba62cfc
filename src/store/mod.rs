//! Document store capability and its backends.
//!
//! The job only ever appends single documents to named collections; there is
//! no query, update or transaction API. A backend is picked from the scheme of
//! the configured store URI:
//!
//! | Scheme | Backend | Layout |
//! |--------|---------|--------|
//! | `sqlite:` | [`SqliteStore`] | one `documents` table, JSON body per row |
//! | `file:` | [`JsonLinesStore`] | `{dir}/{db_name}/{collection}.jsonl` |
//!
//! The store is opened once per process and closed once on exit, on every path.

use crate::error::StoreError;
use crate::models::Document;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};
use url::Url;

mod jsonl;
#[cfg(test)]
pub mod memory;
mod sqlite;

pub use jsonl::JsonLinesStore;
pub use sqlite::SqliteStore;

/// Insert-only document sink.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append one document to `collection`.
    async fn insert_value(&self, collection: &str, document: Value) -> Result<(), StoreError>;

    /// Release the underlying connection or handles.
    async fn close(&self);
}

/// Serialize a typed document and append it to its collection.
pub async fn insert<D>(store: &dyn DocumentStore, document: &D) -> Result<(), StoreError>
where
    D: Document + Sync,
{
    let value = serde_json::to_value(document)?;
    store.insert_value(D::COLLECTION, value).await
}

/// Open the store named by `uri`, scoping documents under `db_name`.
///
/// # Arguments
///
/// * `uri` - `sqlite:` database URL or `file:` directory URL
/// * `db_name` - Logical database name; a column for SQLite, a subdirectory for files
///
/// # Returns
///
/// A boxed backend ready for inserts. Unknown schemes and unparsable URIs are
/// [`StoreError::UnsupportedUri`]; connection and directory failures come back
/// as the backend's own error.
///
/// # Examples
///
/// ```ignore
/// let store = connect("sqlite://news.db", "sane-news").await?;
/// let files = connect("file:///var/lib/news", "sane-news").await?;
/// ```
#[instrument(level = "info", skip_all, fields(%db_name))]
pub async fn connect(uri: &str, db_name: &str) -> Result<Box<dyn DocumentStore>, StoreError> {
    let parsed = Url::parse(uri).map_err(|_| StoreError::UnsupportedUri(uri.to_string()))?;

    match parsed.scheme() {
        "sqlite" => {
            let store = SqliteStore::connect(uri, db_name).await?;
            info!(backend = "sqlite", "Connected to document store");
            Ok(Box::new(store))
        }
        "file" => {
            let dir = parsed
                .to_file_path()
                .map_err(|_| StoreError::UnsupportedUri(uri.to_string()))?;
            let store = JsonLinesStore::open(&dir, db_name).await?;
            info!(backend = "jsonl", root = %store.root().display(), "Opened document store");
            Ok(Box::new(store))
        }
        _ => Err(StoreError::UnsupportedUri(uri.to_string())),
    }
}
