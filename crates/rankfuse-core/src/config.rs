//! Production configuration constants.
//!
//! These values are shared by the engine, the built-in stages and the
//! benchmarks so that all of them agree on the same defaults.
//!
//! # Usage
//!
//! ```
//! use rankfuse_core::config::DEFAULT_BATCH_SIZE;
//! use rankfuse_core::stage::SearchOptions;
//!
//! let options = SearchOptions::default();
//! assert_eq!(options.batch_size(), DEFAULT_BATCH_SIZE);
//! ```

// =============================================================================
// Evaluation
// =============================================================================

/// Number of queries handed to a leaf stage per call when no override is set.
///
/// Only affects how work is chunked for the underlying model, never results.
pub const DEFAULT_BATCH_SIZE: usize = 32;

// =============================================================================
// Dense Vector Search
// =============================================================================

/// Minimum ef_search parameter for HNSW queries.
///
/// The effective value is `max(k * 2, MIN_EF_SEARCH)` so search quality
/// scales with the number of requested neighbours.
pub const MIN_EF_SEARCH: usize = 50;

/// Number of documents embedded per call while indexing.
pub const INDEXING_BATCH_SIZE: usize = 64;

// =============================================================================
// Tree Serialization
// =============================================================================

/// Current schema version of the serialized composition tree.
///
/// The version history:
/// - v1: Initial format (node kind + operands + overrides, leaf configuration)
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Oldest schema version this build can still read.
pub const MIN_COMPATIBLE_SCHEMA_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_is_positive() {
        let batch_size = DEFAULT_BATCH_SIZE;
        assert!(batch_size > 0, "a zero batch size would never make progress");
    }

    #[test]
    fn test_schema_versions_are_ordered() {
        let (min, current) = (MIN_COMPATIBLE_SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
        assert!(min <= current);
    }
}
