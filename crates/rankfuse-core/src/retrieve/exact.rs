//! Exact phrase lookup.
//!
//! Every value of the configured fields (or every element, for arrays) is
//! indexed as a phrase. A document matches when one of its phrases occurs as a
//! contiguous run of tokens in the query, e.g. a `title` of "Saint Malo"
//! matches the query "ferry to saint-malo tomorrow".
//!
//! Matches are ordered by where they start in the query. No score is emitted.

use super::tokenize;
use crate::blueprint::LeafSpec;
use crate::error::StageError;
use crate::stage::{SearchOptions, Stage};
use crate::types::{field_values, Document, DocumentKey, RankedList, ScoredRef};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Matches documents whose field values appear verbatim in the query.
pub struct ExactMatchRetriever {
    name: String,
    key_field: String,
    fields: Vec<String>,
    /// Token phrase -> keys carrying it, in insertion order
    phrases: HashMap<Vec<String>, Vec<DocumentKey>>,
    /// Phrases indexed for each key, for upserts
    by_key: HashMap<DocumentKey, Vec<Vec<String>>>,
    /// Longest phrase ever indexed, in tokens
    max_phrase_len: usize,
}

impl ExactMatchRetriever {
    /// Creates an empty retriever over `fields` of documents keyed by `key_field`.
    pub fn new<I, S>(key_field: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            name: format!("exact({})", fields.join(",")),
            key_field: key_field.into(),
            fields,
            phrases: HashMap::new(),
            by_key: HashMap::new(),
            max_phrase_len: 0,
        }
    }

    /// Overrides the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns `true` if no documents have been indexed.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn remove(&mut self, key: &DocumentKey) {
        let Some(old) = self.by_key.remove(key) else {
            return;
        };
        for phrase in old {
            if let Some(keys) = self.phrases.get_mut(&phrase) {
                keys.retain(|existing| existing != key);
                if keys.is_empty() {
                    self.phrases.remove(&phrase);
                }
            }
        }
    }

    /// Keys whose phrases occur in `tokens`, by match position.
    fn matches(&self, tokens: &[String]) -> Vec<DocumentKey> {
        let mut seen: HashSet<&DocumentKey> = HashSet::new();
        let mut found = Vec::new();

        for start in 0..tokens.len() {
            let longest = self.max_phrase_len.min(tokens.len() - start);
            for len in 1..=longest {
                let Some(keys) = self.phrases.get(&tokens[start..start + len]) else {
                    continue;
                };
                for key in keys {
                    if seen.insert(key) {
                        found.push(key.clone());
                    }
                }
            }
        }
        found
    }
}

#[async_trait(?Send)]
impl Stage for ExactMatchRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> LeafSpec {
        LeafSpec::Exact {
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
        let tokens = tokenize(query);
        if tokens.is_empty() || self.phrases.is_empty() {
            return Ok(RankedList::new());
        }

        let allowed = candidates.map(RankedList::key_set);
        let limit = options.k.unwrap_or(usize::MAX);
        let results: RankedList = self
            .matches(&tokens)
            .into_iter()
            .filter(|key| allowed.as_ref().map_or(true, |allowed| allowed.contains(key)))
            .take(limit)
            .map(ScoredRef::unscored)
            .collect();

        debug!(stage = %self.name, results = results.len(), "Exact match complete");
        Ok(results)
    }

    #[instrument(skip_all, fields(stage = %self.name, documents = documents.len()))]
    async fn add(&mut self, documents: &[Document]) -> Result<(), StageError> {
        for document in documents {
            let key = DocumentKey::from_document(document, &self.key_field)?;
            self.remove(&key);

            let mut indexed = Vec::new();
            for value in field_values(document, &self.fields) {
                let phrase = tokenize(&value);
                if phrase.is_empty() {
                    continue;
                }
                self.max_phrase_len = self.max_phrase_len.max(phrase.len());
                let keys = self.phrases.entry(phrase.clone()).or_default();
                if !keys.contains(&key) {
                    keys.push(key.clone());
                }
                indexed.push(phrase);
            }
            self.by_key.insert(key, indexed);
        }

        debug!(
            documents = self.by_key.len(),
            phrases = self.phrases.len(),
            "Exact match index updated"
        );
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), StageError> {
        self.phrases.clear();
        self.by_key.clear();
        self.max_phrase_len = 0;
        Ok(())
    }
}
