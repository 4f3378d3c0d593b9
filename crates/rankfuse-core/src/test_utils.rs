//! Test utilities for rankfuse-core.
//!
//! Scripted stages and list builders shared by unit tests.
//! Only compiled when running tests.

use crate::error::{BatchFailure, EmbeddingError, StageError};
use crate::retrieve::TextEmbedder;
use crate::stage::{SearchOptions, Stage};
use crate::types::{Document, DocumentKey, RankedList, ScoredRef};
use async_trait::async_trait;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Mutex;

/// Builds an unscored list from integer keys.
pub fn list(keys: &[i32]) -> RankedList {
    keys.iter().map(|&key| ScoredRef::unscored(key)).collect()
}

/// Builds a scored list from `(key, score)` pairs.
pub fn scored(entries: &[(i32, f32)]) -> RankedList {
    entries
        .iter()
        .map(|&(key, score)| ScoredRef::scored(key, score))
        .collect()
}

/// Keys of a list in rank order.
pub fn keys_of(list: &RankedList) -> Vec<DocumentKey> {
    list.keys().cloned().collect()
}

/// Builds a JSON document.
pub fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("test document must be an object")
}

/// Returns the same list for every query.
///
/// With candidates, only candidate keys are returned (in the stage's order).
pub struct StaticStage {
    name: String,
    output: RankedList,
    requires_candidates: bool,
    added: Rc<Cell<usize>>,
    resets: Rc<Cell<usize>>,
}

impl StaticStage {
    pub fn new(name: &str, output: RankedList) -> Self {
        Self {
            name: name.to_string(),
            output,
            requires_candidates: false,
            added: Rc::new(Cell::new(0)),
            resets: Rc::new(Cell::new(0)),
        }
    }

    /// Emits `entries` verbatim, duplicates included.
    pub fn raw(name: &str, entries: Vec<ScoredRef>) -> Self {
        Self::new(name, RankedList(entries))
    }

    pub fn requiring_candidates(mut self) -> Self {
        self.requires_candidates = true;
        self
    }
}

#[async_trait(?Send)]
impl Stage for StaticStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_candidates(&self) -> bool {
        self.requires_candidates
    }

    async fn search(
        &self,
        _query: &str,
        candidates: Option<&RankedList>,
        _options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        match candidates {
            Some(candidates) => {
                let allowed = candidates.key_set();
                Ok(RankedList(
                    self.output
                        .iter()
                        .filter(|entry| allowed.contains(&entry.key))
                        .cloned()
                        .collect(),
                ))
            }
            None => Ok(self.output.clone()),
        }
    }

    async fn add(&mut self, documents: &[Document]) -> Result<(), StageError> {
        self.added.set(self.added.get() + documents.len());
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), StageError> {
        self.resets.set(self.resets.get() + 1);
        Ok(())
    }
}

impl StaticStage {
    /// Shared counter of documents received through `add`.
    pub fn added_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.added)
    }

    /// Shared counter of `reset` calls.
    pub fn reset_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.resets)
    }
}

/// Records every batch it receives; answers like [`StaticStage`].
pub struct RecordingStage {
    inner: StaticStage,
    queries: Mutex<Vec<String>>,
    batches: Mutex<Vec<usize>>,
}

impl RecordingStage {
    pub fn new(name: &str, output: RankedList) -> Self {
        Self {
            inner: StaticStage::new(name, output),
            queries: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait(?Send)]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(
        &self,
        query: &str,
        candidates: Option<&RankedList>,
        options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        self.inner.search(query, candidates, options).await
    }

    async fn search_batch(
        &self,
        queries: &[String],
        candidates: Option<&[RankedList]>,
        options: &SearchOptions,
    ) -> Result<Vec<RankedList>, BatchFailure> {
        self.queries.lock().unwrap().extend(queries.iter().cloned());
        self.batches.lock().unwrap().push(queries.len());

        let mut results = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let candidate_list = candidates.map(|lists| &lists[index]);
            let list = self
                .inner
                .search(query, candidate_list, options)
                .await
                .map_err(|error| BatchFailure::new(index, error))?;
            results.push(list);
        }
        Ok(results)
    }
}

/// Echoes the query as a single string key.
pub struct EchoStage;

#[async_trait(?Send)]
impl Stage for EchoStage {
    fn name(&self) -> &str {
        "echo"
    }

    async fn search(
        &self,
        query: &str,
        _candidates: Option<&RankedList>,
        _options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        Ok(vec![ScoredRef::unscored(query)].into_iter().collect())
    }
}

/// Fails on one specific query (or on maintenance), succeeds otherwise.
pub struct FailingStage {
    name: String,
    bad_query: Option<String>,
    fail_add: bool,
}

impl FailingStage {
    pub fn on_query(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            bad_query: Some(query.to_string()),
            fail_add: false,
        }
    }

    pub fn on_add(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bad_query: None,
            fail_add: true,
        }
    }
}

#[async_trait(?Send)]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        _candidates: Option<&RankedList>,
        _options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        if self.bad_query.as_deref() == Some(query) {
            return Err(StageError::InvalidQuery(query.to_string()));
        }
        Ok(list(&[1]))
    }

    async fn add(&mut self, _documents: &[Document]) -> Result<(), StageError> {
        if self.fail_add {
            return Err(StageError::Unavailable("read-only".to_string()));
        }
        Ok(())
    }
}

/// Bag-of-words feature hashing into a fixed number of buckets.
///
/// Deterministic, so texts sharing words get similar vectors.
pub struct HashingEmbedder {
    pub dimension: usize,
    pub calls: Mutex<usize>,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait(?Send)]
impl TextEmbedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        *self.calls.lock().unwrap() += 1;
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                for word in text.split_whitespace() {
                    let bucket = word
                        .to_lowercase()
                        .bytes()
                        .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    vector[bucket % self.dimension] += 1.0;
                }
                vector
            })
            .collect())
    }
}
