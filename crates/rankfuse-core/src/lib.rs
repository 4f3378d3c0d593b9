//! # rankfuse Core
//!
//! Composition layer for multi-stage retrieval pipelines.
//!
//! Retrievers and rankers are pluggable [`Stage`]s. The engine combines their
//! ranked outputs into a single result stream through a small tree algebra:
//! sequential pipelines, unions, intersections and rank-based votes.
//!
//! ## Modules
//!
//! - [`types`] - Document keys, scored references, ranked lists, queries
//! - [`stage`] - The shared stage contract implemented by every leaf
//! - [`compose`] - Composition tree (pipeline, union, intersection, vote) and batch dispatch
//! - [`retrieve`] - Built-in leaves (BM25 keyword, exact match, dense vector)
//! - [`hydrate`] - Document hydration post-processor
//! - [`storage`] - Async document store trait and in-memory implementation
//! - [`blueprint`] - Versioned structural serialization of composition trees
//! - [`config`] - Production configuration constants
//! - [`error`] - Error types for the engine and its collaborators
//!
//! ## Example
//!
//! ```ignore
//! use rankfuse_core::compose::{sequence, union, Node};
//! use rankfuse_core::retrieve::{ExactMatchRetriever, KeywordRetriever};
//! use rankfuse_core::hydrate::DocumentHydrator;
//! use rankfuse_core::stage::SearchOptions;
//!
//! let mut tree = sequence([
//!     union([
//!         Node::leaf(KeywordRetriever::new("id", ["title"])),
//!         Node::leaf(ExactMatchRetriever::new("id", ["tags"])),
//!     ]),
//!     Node::leaf(DocumentHydrator::in_memory("id")),
//! ]);
//! tree.add(&documents).await?;
//! let results = tree.search("paris", &SearchOptions::with_k(10)).await?;
//! ```

pub mod blueprint;
pub mod compose;
pub mod config;
pub mod error;
pub mod hydrate;
pub mod retrieve;
pub mod stage;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use blueprint::{StageRegistry, TreeSpec};
pub use compose::{intersect, sequence, union, vote, Node};
pub use error::{FusionError, StageError};
pub use stage::{SearchOptions, Stage};
pub use types::{Document, DocumentKey, Query, Ranked, RankedList, ScoredRef};
