//! Tests for composition nodes: batch dispatch, option overrides, error
//! propagation and corpus fan-out.

use super::*;
use crate::error::{BatchFailure, StageError};
use crate::test_utils::{doc, keys_of, list, scored, EchoStage, FailingStage, StaticStage};
use crate::types::DocumentKey;
use async_trait::async_trait;
use serde_json::json;

fn keys(items: &[i32]) -> Vec<DocumentKey> {
    items.iter().map(|&key| DocumentKey::from(key)).collect()
}

fn static_leaf(name: &str, items: &[i32]) -> Node {
    Node::leaf(StaticStage::new(name, list(items)))
}

/// Returns one list fewer than asked for.
struct ShortBatchStage;

#[async_trait(?Send)]
impl Stage for ShortBatchStage {
    fn name(&self) -> &str {
        "short"
    }

    async fn search(
        &self,
        _query: &str,
        _candidates: Option<&RankedList>,
        _options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        Ok(list(&[1]))
    }

    async fn search_batch(
        &self,
        queries: &[String],
        _candidates: Option<&[RankedList]>,
        _options: &SearchOptions,
    ) -> Result<Vec<RankedList>, BatchFailure> {
        Ok(vec![list(&[1]); queries.len().saturating_sub(1)])
    }
}

// =============================================================================
// Output shape and batch order
// =============================================================================

#[tokio::test]
async fn test_single_query_yields_single_list() {
    let tree = static_leaf("a", &[1, 2]);

    let result = tree.evaluate("q", &SearchOptions::default()).await.unwrap();

    assert_eq!(result, Ranked::Single(list(&[1, 2])));
}

#[tokio::test]
async fn test_batch_preserves_query_order() {
    let tree = union([Node::leaf(EchoStage), static_leaf("tail", &[7])]);

    let result = tree
        .evaluate(vec!["paris", "lyon", "nice"], &SearchOptions::default())
        .await
        .unwrap()
        .into_batch();

    assert_eq!(result.len(), 3);
    for (list, query) in result.iter().zip(["paris", "lyon", "nice"]) {
        assert_eq!(
            keys_of(list),
            vec![DocumentKey::from(query), DocumentKey::from(7)]
        );
    }
}

#[tokio::test]
async fn test_empty_batch_yields_empty_batch() {
    let tree = static_leaf("a", &[1]);

    let result = tree
        .evaluate(Vec::<String>::new(), &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(result, Ranked::Batch(vec![]));
}

#[tokio::test]
async fn test_search_returns_one_list() {
    let tree = static_leaf("a", &[3, 4]);
    let result = tree.search("q", &SearchOptions::with_k(1)).await.unwrap();
    assert_eq!(result, list(&[3]));
}

// =============================================================================
// Algebra
// =============================================================================

#[tokio::test]
async fn test_single_operand_compositions_are_identities() {
    let options = SearchOptions::default();
    let expected = scored(&[(1, 0.9), (2, 0.5)]);

    for tree in [
        sequence([Node::leaf(StaticStage::new("a", expected.clone()))]),
        union([Node::leaf(StaticStage::new("a", expected.clone()))]),
        intersect([Node::leaf(StaticStage::new("a", expected.clone()))]),
    ] {
        let result = tree.search("q", &options).await.unwrap();
        assert_eq!(result, expected, "{}", tree.kind_name());
    }

    // Vote recomputes scores but keeps the order
    let tree = vote([Node::leaf(StaticStage::new("a", expected.clone()))]);
    let result = tree.search("q", &options).await.unwrap();
    assert_eq!(keys_of(&result), keys(&[1, 2]));
}

#[tokio::test]
async fn test_union_with_itself_is_idempotent() {
    let tree = union([static_leaf("a", &[1, 2, 3]), static_leaf("b", &[1, 2, 3])]);
    let result = tree.search("q", &SearchOptions::default()).await.unwrap();
    assert_eq!(result, list(&[1, 2, 3]));
}

#[tokio::test]
async fn test_pipeline_restricts_to_previous_output() {
    let tree = sequence([
        static_leaf("retriever", &[1, 2, 3]),
        Node::leaf(StaticStage::new("ranker", scored(&[(3, 0.9), (4, 0.8), (1, 0.1)]))),
    ]);

    let result = tree.search("q", &SearchOptions::default()).await.unwrap();

    assert_eq!(keys_of(&result), keys(&[3, 1]));
}

#[tokio::test]
async fn test_nested_pipeline_receives_candidates() {
    let inner = sequence([
        Node::leaf(StaticStage::new("rerank", list(&[4, 2, 1])).requiring_candidates()),
        static_leaf("keep", &[1, 2, 3, 4]),
    ]);
    let tree = sequence([static_leaf("retriever", &[1, 2]), inner]);

    let result = tree.search("q", &SearchOptions::default()).await.unwrap();

    assert_eq!(keys_of(&result), keys(&[1, 2]));
}

#[tokio::test]
async fn test_fusion_inside_pipeline_sees_same_candidates() {
    let tree = sequence([
        static_leaf("retriever", &[1, 2, 3]),
        union([static_leaf("a", &[5, 3]), static_leaf("b", &[2, 9])]),
    ]);

    let result = tree.search("q", &SearchOptions::default()).await.unwrap();

    assert_eq!(keys_of(&result), keys(&[3, 2]));
}

#[tokio::test]
async fn test_empty_candidates_skip_remaining_steps() {
    let tree = sequence([
        static_leaf("retriever", &[]),
        Node::leaf(FailingStage::on_query("ranker", "q")),
    ]);

    let result = tree.search("q", &SearchOptions::default()).await.unwrap();

    assert!(result.is_empty());
}

// =============================================================================
// Options
// =============================================================================

#[tokio::test]
async fn test_call_k_caps_every_leaf() {
    let tree = union([static_leaf("a", &[1, 2, 3]), static_leaf("b", &[4, 5, 6])]);

    let result = tree.search("q", &SearchOptions::with_k(2)).await.unwrap();

    assert_eq!(result, list(&[1, 2]));
}

#[tokio::test]
async fn test_node_override_beats_call_options() {
    let tree = union([
        static_leaf("a", &[1, 2, 3]).with_k(1),
        static_leaf("b", &[4, 5, 6]),
    ]);

    let result = tree.search("q", &SearchOptions::with_k(10)).await.unwrap();

    assert_eq!(result, list(&[1, 4, 5, 6]));
}

#[tokio::test]
async fn test_root_override_caps_output() {
    let tree = union([static_leaf("a", &[1, 2]), static_leaf("b", &[3, 4])]).with_k(3);

    let result = tree.search("q", &SearchOptions::with_k(10)).await.unwrap();

    assert_eq!(result, list(&[1, 2, 3]));
}

#[tokio::test]
async fn test_pipeline_override_caps_last_step() {
    let tree = sequence([static_leaf("a", &[1, 2, 3])]).with_k(2);
    let result = tree.search("q", &SearchOptions::default()).await.unwrap();
    assert_eq!(result, list(&[1, 2]));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_empty_compositions_are_configuration_errors() {
    let options = SearchOptions::default();

    for tree in [
        sequence(Vec::new()),
        union(Vec::new()),
        intersect(Vec::new()),
        vote(Vec::new()),
    ] {
        let err = tree.search("q", &options).await.unwrap_err();
        assert!(
            matches!(err, FusionError::EmptyComposition { .. }),
            "{}",
            tree.kind_name()
        );
        assert!(err.is_configuration());
    }
}

#[tokio::test]
async fn test_missing_candidates_at_pipeline_start() {
    let tree = sequence([
        Node::leaf(StaticStage::new("documents", list(&[])).requiring_candidates()),
        static_leaf("a", &[1]),
    ]);

    let err = tree.search("q", &SearchOptions::default()).await.unwrap_err();

    match err {
        FusionError::MissingCandidates { stage } => assert_eq!(stage, "documents"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_batch_length_mismatch_is_reported() {
    let tree = union([Node::leaf(ShortBatchStage), static_leaf("a", &[1])]);

    let err = tree
        .evaluate(vec!["a", "b"], &SearchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FusionError::BatchLengthMismatch {
            expected: 2,
            actual: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_first_declared_failure_wins() {
    let tree = vote([
        static_leaf("ok", &[1]),
        Node::leaf(FailingStage::on_query("first", "q")),
        Node::leaf(FailingStage::on_query("second", "q")),
    ]);

    let err = tree.search("q", &SearchOptions::default()).await.unwrap_err();

    match err {
        FusionError::Stage { stage, index, .. } => {
            assert_eq!(stage, "first");
            assert_eq!(index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_batch_failure_reports_query_index() {
    let tree = intersect([
        static_leaf("ok", &[1]),
        Node::leaf(FailingStage::on_query("flaky", "bad")),
    ]);

    let err = tree
        .evaluate(vec!["good", "good", "bad"], &SearchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FusionError::Stage { index: 2, .. }));
    assert!(!err.is_configuration());
}

// =============================================================================
// Corpus maintenance
// =============================================================================

#[tokio::test]
async fn test_add_and_reset_reach_every_leaf() {
    let stages: Vec<StaticStage> = (0..4)
        .map(|i| StaticStage::new(&format!("s{i}"), list(&[])))
        .collect();
    let added: Vec<_> = stages.iter().map(StaticStage::added_counter).collect();
    let resets: Vec<_> = stages.iter().map(StaticStage::reset_counter).collect();

    let mut leaves = stages.into_iter().map(Node::leaf);
    let mut tree = sequence([
        vote([
            leaves.next().unwrap(),
            union([leaves.next().unwrap(), leaves.next().unwrap()]),
        ]),
        leaves.next().unwrap(),
    ]);

    let documents = vec![doc(json!({"id": 1})), doc(json!({"id": 2}))];
    tree.add(&documents).await.unwrap();
    tree.add(&documents[..1]).await.unwrap();
    tree.reset().await.unwrap();

    assert!(added.iter().all(|counter| counter.get() == 3));
    assert!(resets.iter().all(|counter| counter.get() == 1));
}

#[tokio::test]
async fn test_add_failure_names_stage() {
    let mut tree = union([static_leaf("a", &[]), Node::leaf(FailingStage::on_add("ro"))]);

    let err = tree.add(&[doc(json!({"id": 1}))]).await.unwrap_err();

    match err {
        FusionError::Maintenance {
            stage, operation, ..
        } => {
            assert_eq!(stage, "ro");
            assert_eq!(operation, "add");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_add_is_chainable() {
    let mut tree = static_leaf("a", &[1]);
    let result = tree
        .add(&[doc(json!({"id": 1}))])
        .await
        .unwrap()
        .search("q", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(result, list(&[1]));
}

// =============================================================================
// Construction and rendering
// =============================================================================

#[test]
fn test_operator_helpers_flatten_same_kind() {
    let tree = static_leaf("a", &[])
        .or(static_leaf("b", &[]))
        .or(static_leaf("c", &[]));
    assert_eq!(tree.kind_name(), "union");
    assert_eq!(tree.children().len(), 3);

    let tree = static_leaf("a", &[]).then(static_leaf("b", &[]).then(static_leaf("c", &[])));
    assert_eq!(tree.kind_name(), "pipeline");
    assert_eq!(tree.children().len(), 3);

    // Overrides keep a node from being flattened
    let tree = static_leaf("a", &[])
        .and(static_leaf("b", &[]))
        .with_k(5)
        .and(static_leaf("c", &[]));
    assert_eq!(tree.children().len(), 2);
    assert_eq!(tree.children()[0].k(), Some(5));
}

#[test]
fn test_vote_is_not_flattened() {
    let inner = vote([static_leaf("a", &[]), static_leaf("b", &[])]);
    let tree = vote([inner, static_leaf("c", &[])]);
    assert_eq!(tree.children().len(), 2);
    assert_eq!(tree.leaf_count(), 3);
}

#[test]
fn test_display_renders_tree() {
    let tree = sequence([
        vote([static_leaf("title", &[]), static_leaf("article", &[])]).with_k(20),
        static_leaf("documents", &[]).with_batch_size(8),
    ]);

    let rendered = tree.to_string();
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines[0], "pipeline");
    assert_eq!(lines[1], "  vote k=20");
    assert!(lines[2].starts_with("    ") && lines[2].contains("title"));
    assert!(lines[4].contains("documents") && lines[4].ends_with("batch_size=8"));
}

#[test]
fn test_debug_names_stages() {
    let tree = union([static_leaf("a", &[])]);
    let debug = format!("{:?}", tree);
    assert!(debug.contains("union"));
    assert!(debug.contains("\"a\""));
}
