//! Batch dispatch shared by every composition node.
//!
//! Internally every evaluation is a batch: a single query is a batch of one
//! and is unwrapped again by [`shape`]. Fusion nodes evaluate their operands
//! on the whole batch and then fuse the *i*-th list of every operand into the
//! *i*-th output.

use super::Node;
use crate::error::FusionError;
use crate::stage::SearchOptions;
use crate::types::{Query, Ranked, RankedList};
use futures::future::join_all;

/// Wraps per-query results in the shape of the original query.
pub(super) fn shape(query: &Query, lists: Vec<RankedList>) -> Ranked {
    match query {
        Query::Single(_) => Ranked::Single(lists.into_iter().next().unwrap_or_default()),
        Query::Batch(_) => Ranked::Batch(lists),
    }
}

/// Fails unless a producer returned exactly one list per query.
pub(super) fn check_len(node: &str, expected: usize, actual: usize) -> Result<(), FusionError> {
    if expected == actual {
        Ok(())
    } else {
        Err(FusionError::BatchLengthMismatch {
            node: node.to_string(),
            expected,
            actual,
        })
    }
}

/// Evaluates sibling operands concurrently on the same batch.
///
/// Results are inspected in declaration order, so the error reported is the
/// one from the first failing operand regardless of completion order.
/// Returns `outputs[operand][query]`.
pub(super) async fn evaluate_operands(
    node: &'static str,
    operands: &[Node],
    queries: &[String],
    options: &SearchOptions,
    candidates: Option<&[RankedList]>,
) -> Result<Vec<Vec<RankedList>>, FusionError> {
    if operands.is_empty() {
        return Err(FusionError::EmptyComposition { node });
    }

    let outputs = join_all(
        operands
            .iter()
            .map(|operand| operand.evaluate_batch(queries, options, candidates)),
    )
    .await;

    let mut columns = Vec::with_capacity(operands.len());
    for output in outputs {
        let lists = output?;
        check_len(node, queries.len(), lists.len())?;
        columns.push(lists);
    }
    Ok(columns)
}

/// The lists every operand produced for query `index`, in declaration order.
pub(super) fn row(outputs: &[Vec<RankedList>], index: usize) -> Vec<&RankedList> {
    outputs.iter().map(|lists| &lists[index]).collect()
}

/// Applies `fuse` to every query of the batch.
pub(super) fn fuse_rows(
    outputs: &[Vec<RankedList>],
    queries: usize,
    k: Option<usize>,
    fuse: fn(&[&RankedList], Option<usize>) -> RankedList,
) -> Vec<RankedList> {
    (0..queries)
        .map(|index| fuse(&row(outputs, index), k))
        .collect()
}
