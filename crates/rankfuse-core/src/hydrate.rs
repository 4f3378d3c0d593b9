//! Document hydration: attaches full documents to ranked keys.
//!
//! Placed at the end of a pipeline, after retrieval and fusion:
//!
//! ```ignore
//! let tree = sequence([
//!     vote([title, article]),
//!     Node::leaf(DocumentHydrator::in_memory("id")),
//! ]);
//! ```
//!
//! Order and scores are preserved. A key the store doesn't know is passed
//! through without fields rather than dropped.

use crate::blueprint::LeafSpec;
use crate::error::StageError;
use crate::stage::{SearchOptions, Stage};
use crate::storage::{DocumentStore, InMemoryDocumentStore};
use crate::types::{Document, DocumentKey, RankedList, ScoredRef};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

/// Post-processor that looks up candidate keys in a [`DocumentStore`].
pub struct DocumentHydrator<S: DocumentStore = InMemoryDocumentStore> {
    key_field: String,
    store: S,
}

impl DocumentHydrator<InMemoryDocumentStore> {
    /// Hydrator backed by a fresh in-memory store.
    pub fn in_memory(key_field: impl Into<String>) -> Self {
        Self::with_store(key_field, InMemoryDocumentStore::new())
    }
}

impl<S: DocumentStore> DocumentHydrator<S> {
    /// Hydrator backed by `store`.
    pub fn with_store(key_field: impl Into<String>, store: S) -> Self {
        Self {
            key_field: key_field.into(),
            store,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait(?Send)]
impl<S: DocumentStore> Stage for DocumentHydrator<S> {
    fn name(&self) -> &str {
        "documents"
    }

    fn requires_candidates(&self) -> bool {
        true
    }

    fn spec(&self) -> LeafSpec {
        LeafSpec::Documents {
            key: self.key_field.clone(),
        }
    }

    async fn search(
        &self,
        _query: &str,
        candidates: Option<&RankedList>,
        options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        let Some(candidates) = candidates else {
            return Ok(RankedList::new());
        };

        let limit = options.k.unwrap_or(candidates.len());
        let entries: Vec<&ScoredRef> = candidates.iter().take(limit).collect();
        let keys: Vec<DocumentKey> = entries.iter().map(|entry| entry.key.clone()).collect();
        let documents = self.store.get_documents_batch(&keys).await?;

        let mut missing = 0;
        let hydrated: RankedList = entries
            .into_iter()
            .zip(documents)
            .map(|(entry, document)| {
                if document.is_none() {
                    missing += 1;
                }
                ScoredRef {
                    key: entry.key.clone(),
                    score: entry.score,
                    fields: document,
                }
            })
            .collect();

        if missing > 0 {
            warn!(missing, "Hydration found no document for some keys");
        }
        Ok(hydrated)
    }

    #[instrument(skip_all, fields(documents = documents.len()))]
    async fn add(&mut self, documents: &[Document]) -> Result<(), StageError> {
        for document in documents {
            let key = DocumentKey::from_document(document, &self.key_field)?;
            self.store.put_document(key, document).await?;
        }
        debug!(
            stored = self.store.document_count().await?,
            "Document store updated"
        );
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), StageError> {
        self.store.clear().await?;
        Ok(())
    }
}
