//! The shared stage contract.
//!
//! Every leaf of a composition tree (retriever, ranker or post-processor)
//! implements [`Stage`]. Composition nodes only ever talk to leaves through
//! this trait, so any backend can be plugged in.
//!
//! # Thread Safety
//!
//! Stages are evaluated through `&self` and may be evaluated concurrently with
//! their siblings. Corpus updates (`add`, `reset`) take `&mut self` and can
//! therefore never overlap with evaluation on the same tree.

use crate::blueprint::LeafSpec;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{BatchFailure, StageError};
use crate::types::{Document, RankedList};
use async_trait::async_trait;

/// Per-call evaluation options.
///
/// Composition nodes may carry their own overrides, which always take
/// precedence over the options they receive from their parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of results per query (`None` = no cap)
    pub k: Option<usize>,
    /// Number of queries handed to a leaf per call (`None` = default)
    pub batch_size: Option<usize>,
}

impl SearchOptions {
    /// Options with a result cap.
    pub fn with_k(k: usize) -> Self {
        Self {
            k: Some(k),
            batch_size: None,
        }
    }

    /// Sets the batch size hint.
    pub fn batch_size_hint(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Effective batch size (never zero).
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1)
    }

    /// Applies a node's overrides; the given `k` and `batch_size` win when set.
    pub fn overridden_by(&self, k: Option<usize>, batch_size: Option<usize>) -> Self {
        Self {
            k: k.or(self.k),
            batch_size: batch_size.or(self.batch_size),
        }
    }
}

/// Pluggable retrieval, ranking or post-processing component.
///
/// Implementations must emit key-unique lists. The engine de-duplicates
/// defensively, truncates to `k` and short-circuits empty candidate lists, so
/// a stage only has to get the ranking itself right.
///
/// # Examples
///
/// ```ignore
/// struct Fixed(RankedList);
///
/// #[async_trait(?Send)]
/// impl Stage for Fixed {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn search(
///         &self,
///         _query: &str,
///         _candidates: Option<&RankedList>,
///         _options: &SearchOptions,
///     ) -> Result<RankedList, StageError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait(?Send)]
pub trait Stage {
    /// Short name used in logs, errors and tree rendering.
    fn name(&self) -> &str;

    /// Whether the stage can only work on a candidate list (rankers without a
    /// retrieval mode, hydration). Such a stage cannot start a pipeline.
    fn requires_candidates(&self) -> bool {
        false
    }

    /// Structural description used to serialize the tree.
    ///
    /// Stages outside this crate are described by name and rebuilt through a
    /// [`StageRegistry`](crate::blueprint::StageRegistry).
    fn spec(&self) -> LeafSpec {
        LeafSpec::External {
            name: self.name().to_string(),
        }
    }

    /// Ranks documents for one query.
    ///
    /// When `candidates` is set, the output must only contain candidate keys.
    async fn search(
        &self,
        query: &str,
        candidates: Option<&RankedList>,
        options: &SearchOptions,
    ) -> Result<RankedList, StageError>;

    /// Ranks documents for a batch of queries.
    ///
    /// The default implementation calls [`search`](Self::search) once per
    /// query. Stages backed by a model that benefits from batching override it.
    /// `candidates`, when set, has one entry per query.
    async fn search_batch(
        &self,
        queries: &[String],
        candidates: Option<&[RankedList]>,
        options: &SearchOptions,
    ) -> Result<Vec<RankedList>, BatchFailure> {
        let mut results = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let candidate_list = candidates.and_then(|lists| lists.get(index));
            let list = self
                .search(query, candidate_list, options)
                .await
                .map_err(|error| BatchFailure::new(index, error))?;
            results.push(list);
        }
        Ok(results)
    }

    /// Adds documents to the stage's corpus (upsert by key).
    ///
    /// Stages that index nothing keep the default no-op.
    async fn add(&mut self, _documents: &[Document]) -> Result<(), StageError> {
        Ok(())
    }

    /// Clears the stage's corpus.
    async fn reset(&mut self) -> Result<(), StageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let parent = SearchOptions::with_k(10).batch_size_hint(8);

        let child = parent.overridden_by(Some(3), None);
        assert_eq!(child.k, Some(3));
        assert_eq!(child.batch_size, Some(8));

        let unchanged = parent.overridden_by(None, None);
        assert_eq!(unchanged, parent);
    }

    #[test]
    fn test_batch_size_never_zero() {
        let options = SearchOptions::default().batch_size_hint(0);
        assert_eq!(options.batch_size(), 1);
        assert_eq!(SearchOptions::default().batch_size(), DEFAULT_BATCH_SIZE);
    }
}
