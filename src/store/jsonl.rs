//! Append-only JSON Lines document store.
//!
//! Each collection is one file under the database directory:
//! ```text
//! store_dir/
//! └── sane-news/
//!     ├── news.jsonl
//!     └── agent_call_log.jsonl
//! ```

use crate::error::StoreError;
use crate::utils::ensure_writable_dir;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::DocumentStore;

/// Writes one JSON document per line to `{root}/{collection}.jsonl`.
#[derive(Debug)]
pub struct JsonLinesStore {
    root: PathBuf,
}

impl JsonLinesStore {
    /// Create `{dir}/{db_name}` if needed and check that it is writable.
    #[instrument(level = "info", skip_all, fields(dir = %dir.display(), %db_name))]
    pub async fn open(dir: &Path, db_name: &str) -> Result<Self, StoreError> {
        let root = dir.join(db_name);
        ensure_writable_dir(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.jsonl"))
    }
}

#[async_trait]
impl DocumentStore for JsonLinesStore {
    async fn insert_value(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&document)?;
        line.push('\n');

        let path = self.collection_path(collection);
        // A single write per document keeps lines whole under O_APPEND.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = line.len(), "Appended document");
        Ok(())
    }

    async fn close(&self) {}
}
