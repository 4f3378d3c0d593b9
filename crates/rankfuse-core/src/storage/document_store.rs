//! Document store trait for keyed document lookups.
//!
//! Provides random access to whole documents by [`DocumentKey`], plus a batch
//! lookup used when hydrating ranked lists.

use crate::types::{Document, DocumentKey};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (lock poisoning, unreachable database, etc.)
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Keyed document store.
///
/// Each operation is self-contained; no transaction primitives are exposed.
#[async_trait::async_trait(?Send)]
pub trait DocumentStore {
    /// Retrieves a document by key.
    ///
    /// Returns `Ok(None)` if the document doesn't exist.
    async fn get_document(&self, key: &DocumentKey) -> Result<Option<Document>, StoreError>;

    /// Stores a document under `key`.
    ///
    /// Overwrites any existing document with the same key.
    async fn put_document(&self, key: DocumentKey, document: &Document)
        -> Result<(), StoreError>;

    /// Deletes a document by key.
    ///
    /// Returns `Ok(())` even if the document didn't exist.
    async fn delete_document(&self, key: &DocumentKey) -> Result<(), StoreError>;

    /// Retrieves multiple documents in a single operation.
    ///
    /// The output is aligned with `keys`: missing documents yield `None`.
    async fn get_documents_batch(
        &self,
        keys: &[DocumentKey],
    ) -> Result<Vec<Option<Document>>, StoreError>;

    /// Returns the number of documents in the store.
    async fn document_count(&self) -> Result<usize, StoreError>;

    /// Removes every document.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory document store.
///
/// Keeps everything in a `HashMap` and doesn't persist.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: std::sync::RwLock<HashMap<DocumentKey, Document>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait(?Send)]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, key: &DocumentKey) -> Result<Option<Document>, StoreError> {
        let docs = self
            .documents
            .read()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        Ok(docs.get(key).cloned())
    }

    async fn put_document(
        &self,
        key: DocumentKey,
        document: &Document,
    ) -> Result<(), StoreError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        docs.insert(key, document.clone());
        Ok(())
    }

    async fn delete_document(&self, key: &DocumentKey) -> Result<(), StoreError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        docs.remove(key);
        Ok(())
    }

    async fn get_documents_batch(
        &self,
        keys: &[DocumentKey],
    ) -> Result<Vec<Option<Document>>, StoreError> {
        let docs = self
            .documents
            .read()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        Ok(keys.iter().map(|key| docs.get(key).cloned()).collect())
    }

    async fn document_count(&self) -> Result<usize, StoreError> {
        let docs = self
            .documents
            .read()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        Ok(docs.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        docs.clear();
        Ok(())
    }
}
