//! Error types for rankfuse-core.
//!
//! Three layers of errors exist:
//!
//! - [`FusionError`] is returned by composition nodes. It is either a
//!   configuration problem detected at evaluation time or a wrapped leaf
//!   failure.
//! - [`StageError`] is returned by individual stages (retrievers, rankers,
//!   post-processors).
//! - [`EmbeddingError`] and [`StoreError`](crate::storage::StoreError) come from
//!   collaborators used by the built-in stages.
//!
//! An empty result is never an error.

use crate::storage::StoreError;
use thiserror::Error;

/// Errors raised while evaluating or maintaining a composition tree.
#[derive(Debug, Error)]
pub enum FusionError {
    /// A stage that only re-ranks or post-processes was evaluated without candidates
    #[error("Stage `{stage}` requires candidates but received none; place it after a retriever")]
    MissingCandidates {
        /// Name of the offending stage
        stage: String,
    },
    /// An operand returned a different number of ranked lists than queries given
    #[error("Batch length mismatch in {node}: expected {expected}, got {actual}")]
    BatchLengthMismatch {
        /// Node or stage that produced the mismatched batch
        node: String,
        /// Number of queries in the batch
        expected: usize,
        /// Number of ranked lists returned
        actual: usize,
    },
    /// A pipeline, union, intersection or vote without operands
    #[error("Empty {node}: at least one operand is required")]
    EmptyComposition {
        /// Kind of node
        node: &'static str,
    },
    /// A leaf stage failed while evaluating one query of the batch
    #[error("Stage `{stage}` failed on query {index}: {source}")]
    Stage {
        /// Name of the failing stage
        stage: String,
        /// Index of the failing query within the batch (0 for single queries)
        index: usize,
        /// Underlying stage error
        #[source]
        source: StageError,
    },
    /// A leaf stage failed while adding documents or resetting its corpus
    #[error("Stage `{stage}` failed to {operation}: {source}")]
    Maintenance {
        /// Name of the failing stage
        stage: String,
        /// `add` or `reset`
        operation: &'static str,
        /// Underlying stage error
        #[source]
        source: StageError,
    },
    /// Serialized tree written by an incompatible version
    #[error("Incompatible tree schema version {found} (supported: {min}..={current})")]
    IncompatibleSchema {
        /// Version found in the serialized tree
        found: u32,
        /// Oldest readable version
        min: u32,
        /// Current version
        current: u32,
    },
    /// Serialized tree references an external stage nobody registered
    #[error("Unknown external stage `{0}`: no factory registered")]
    UnknownStage(String),
    /// Serialized tree could not be parsed or written
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FusionError {
    /// Returns `true` for malformed compositions (as opposed to leaf failures).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FusionError::MissingCandidates { .. }
                | FusionError::BatchLengthMismatch { .. }
                | FusionError::EmptyComposition { .. }
        )
    }
}

impl From<serde_json::Error> for FusionError {
    fn from(err: serde_json::Error) -> Self {
        FusionError::Serialization(err.to_string())
    }
}

/// Errors raised by individual stages.
#[derive(Debug, Error)]
pub enum StageError {
    /// Document lacks the field declared as its unique key
    #[error("Document is missing key field `{0}`")]
    MissingKey(String),
    /// Key field holds something other than a string or an integer
    #[error("Key field `{0}` must be a string or an integer")]
    InvalidKey(String),
    /// Query cannot be processed by this stage
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Backend unavailable or not initialized
    #[error("Stage unavailable: {0}")]
    Unavailable(String),
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Vector dimension mismatch (expected vs actual)
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension
        expected: usize,
        /// Actual embedding dimension received
        actual: usize,
    },
    /// Document store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A stage's batch call failed on one element.
#[derive(Debug, Error)]
#[error("query {index}: {error}")]
pub struct BatchFailure {
    /// Index of the failing query relative to the batch passed to the stage
    pub index: usize,
    /// Underlying stage error
    #[source]
    pub error: StageError,
}

impl BatchFailure {
    /// Creates a failure for the query at `index`.
    pub fn new(index: usize, error: StageError) -> Self {
        Self { index, error }
    }
}

/// Errors that can occur while computing embeddings.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Forward pass through the model failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

/// Validates that an embedding has the expected dimension.
///
/// Returns `Ok(())` if dimensions match, or `Err(StageError::DimensionMismatch)` otherwise.
pub fn validate_dimension(expected: usize, actual: usize) -> Result<(), StageError> {
    if actual == expected {
        Ok(())
    } else {
        Err(StageError::DimensionMismatch { expected, actual })
    }
}
