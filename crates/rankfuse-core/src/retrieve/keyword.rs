//! BM25 keyword retrieval.
//!
//! Wraps the [`bm25`](https://crates.io/crates/bm25) crate. The indexed text of
//! a document is the concatenation of its configured fields, so two retrievers
//! over different fields of the same corpus rank independently:
//!
//! ```ignore
//! let title = KeywordRetriever::new("id", ["title"]);
//! let article = KeywordRetriever::new("id", ["article"]);
//! ```
//!
//! Scores are raw BM25 scores and are not comparable across retrievers; use a
//! vote rather than an intersection to combine them by rank.

use crate::blueprint::LeafSpec;
use crate::error::StageError;
use crate::stage::{SearchOptions, Stage};
use crate::types::{field_text, Document, DocumentKey, RankedList, ScoredRef};
use async_trait::async_trait;
use bm25::{Language, SearchEngine, SearchEngineBuilder};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// BM25 retriever over a set of document fields.
///
/// # Features
///
/// - **Case-insensitive**: Queries and documents are normalized
/// - **Language-aware**: English tokenization and stemming
/// - **Upsert**: Re-adding a key replaces the indexed text
pub struct KeywordRetriever {
    name: String,
    key_field: String,
    fields: Vec<String>,
    /// BM25 search engine keyed by dense internal ids
    engine: SearchEngine<u64>,
    /// Internal id of every key seen so far
    ids: HashMap<DocumentKey, u64>,
    /// Reverse mapping: internal id -> key
    keys: Vec<DocumentKey>,
}

impl KeywordRetriever {
    /// Creates an empty retriever indexing `fields` of documents keyed by `key_field`.
    pub fn new<I, S>(key_field: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            name: format!("keyword({})", fields.join(",")),
            key_field: key_field.into(),
            fields,
            engine: empty_engine(),
            ids: HashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Overrides the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no documents have been indexed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn empty_engine() -> SearchEngine<u64> {
    // with_documents pins the id type to u64
    let empty_docs: Vec<bm25::Document<u64>> = vec![];
    SearchEngineBuilder::<u64>::with_documents(Language::English, empty_docs).build()
}

#[async_trait(?Send)]
impl Stage for KeywordRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> LeafSpec {
        LeafSpec::Keyword {
            key: self.key_field.clone(),
            on: self.fields.clone(),
        }
    }

    async fn search(
        &self,
        query: &str,
        candidates: Option<&RankedList>,
        options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        if query.trim().is_empty() || self.keys.is_empty() {
            return Ok(RankedList::new());
        }

        // Candidate filtering happens after scoring, so every match is needed
        let limit = match (candidates, options.k) {
            (None, Some(k)) => k,
            _ => self.keys.len(),
        };

        let allowed = candidates.map(RankedList::key_set);
        let results: RankedList = self
            .engine
            .search(query, limit)
            .into_iter()
            .filter_map(|result| {
                let key = self.keys.get(result.document.id as usize)?;
                match &allowed {
                    Some(allowed) if !allowed.contains(key) => None,
                    _ => Some(ScoredRef::scored(key.clone(), result.score)),
                }
            })
            .collect();

        debug!(
            stage = %self.name,
            results = results.len(),
            "Keyword search complete"
        );
        Ok(results)
    }

    #[instrument(skip_all, fields(stage = %self.name, documents = documents.len()))]
    async fn add(&mut self, documents: &[Document]) -> Result<(), StageError> {
        for document in documents {
            let key = DocumentKey::from_document(document, &self.key_field)?;
            let next_id = self.keys.len() as u64;
            let id = *self.ids.entry(key.clone()).or_insert_with(|| {
                self.keys.push(key);
                next_id
            });

            self.engine.upsert(bm25::Document {
                id,
                contents: field_text(document, &self.fields),
            });
        }

        debug!(indexed = self.keys.len(), "Keyword index updated");
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), StageError> {
        self.engine = empty_engine();
        self.ids.clear();
        self.keys.clear();
        Ok(())
    }
}
