//! Search command implementation.
//!
//! Loads the corpus and the composition tree, then evaluates queries.

use anyhow::{anyhow, Context, Result};
use rankfuse_core::blueprint::{StageRegistry, TreeSpec};
use rankfuse_core::compose::{sequence, union, vote, Node};
use rankfuse_core::hydrate::DocumentHydrator;
use rankfuse_core::retrieve::{ExactMatchRetriever, KeywordRetriever};
use rankfuse_core::{Document, Query, RankedList, SearchOptions};
use std::path::Path;
use tracing::info;

/// Loads documents from a JSON array or a JSON Lines file.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;

    let documents = if contents.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<Document>>(&contents)
            .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?
    } else {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<Document>(line).with_context(|| {
                    format!("Failed to parse {} line {}", path.display(), idx + 1)
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Builds the tree from a pipeline file, or the built-in tree when none is given.
pub fn load_tree(pipeline: Option<&Path>, key: &str, fields: &[String]) -> Result<Node> {
    let Some(path) = pipeline else {
        return default_tree(key, fields);
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    let spec = TreeSpec::from_json(&json)
        .with_context(|| format!("Failed to parse pipeline file: {}", path.display()))?;
    let tree = spec
        .build(&StageRegistry::new())
        .with_context(|| format!("Failed to build pipeline from {}", path.display()))?;

    info!("Loaded tree with {} stages from {}", tree.leaf_count(), path.display());
    Ok(tree)
}

/// Exact title matches first, then a vote of one BM25 retriever per field,
/// hydrated from an in-memory store.
pub fn default_tree(key: &str, fields: &[String]) -> Result<Node> {
    let Some(first) = fields.first() else {
        return Err(anyhow!("At least one field is required (--on)"));
    };

    let keyword = fields
        .iter()
        .map(|field| Node::leaf(KeywordRetriever::new(key, [field.as_str()])));

    Ok(sequence([
        union([
            Node::leaf(ExactMatchRetriever::new(key, [first.as_str()])),
            vote(keyword),
        ]),
        Node::leaf(DocumentHydrator::in_memory(key)),
    ]))
}

/// Evaluates `queries` on `tree`, one result list per query.
///
/// A single query is evaluated on its own, several queries as one batch.
pub async fn execute_search(
    tree: &Node,
    queries: &[String],
    options: &SearchOptions,
) -> Result<Vec<RankedList>> {
    let query = match queries {
        [single] => Query::Single(single.clone()),
        _ => Query::Batch(queries.to_vec()),
    };

    let results = tree
        .evaluate(query, options)
        .await
        .context("Search failed")?;
    Ok(results.into_batch())
}
