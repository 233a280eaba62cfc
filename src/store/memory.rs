//! In-memory store for tests.

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::DocumentStore;

/// Records inserts in order and can be told to start failing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<(String, Value)>>,
    fail_after: Option<usize>,
    fail_collection: Option<&'static str>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every insert once `n` documents have been stored.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Fail every insert into `collection`.
    pub fn failing_on(collection: &'static str) -> Self {
        Self {
            fail_collection: Some(collection),
            ..Self::default()
        }
    }

    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_value(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let over_limit = self.fail_after.is_some_and(|n| documents.len() >= n);
        if over_limit || self.fail_collection == Some(collection) {
            return Err(StoreError::Io(io::Error::other(format!("{collection} unavailable"))));
        }
        documents.push((collection.to_string(), document));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
