//! Pipeline: sequential composition.
//!
//! Each step receives the original queries plus the previous step's ranked
//! lists as candidates. The first step receives whatever candidates were
//! handed to the pipeline itself (none at the root of a tree), so it has to be
//! able to retrieve on its own.

use super::Node;
use crate::error::FusionError;
use crate::stage::SearchOptions;
use crate::types::RankedList;
use instant::Instant;
use tracing::debug;

pub(super) async fn evaluate(
    steps: &[Node],
    queries: &[String],
    options: &SearchOptions,
    candidates: Option<&[RankedList]>,
) -> Result<Vec<RankedList>, FusionError> {
    let Some((first, rest)) = steps.split_first() else {
        return Err(FusionError::EmptyComposition { node: "pipeline" });
    };

    let start = Instant::now();
    let mut current = first.evaluate_batch(queries, options, candidates).await?;
    debug!(
        step = 0,
        node = first.kind_name(),
        results = current.iter().map(RankedList::len).sum::<usize>(),
        "Pipeline step complete"
    );

    for (idx, step) in rest.iter().enumerate() {
        let previous = std::mem::take(&mut current);
        current = step
            .evaluate_batch(queries, options, Some(previous.as_slice()))
            .await?;
        debug!(
            step = idx + 1,
            node = step.kind_name(),
            results = current.iter().map(RankedList::len).sum::<usize>(),
            "Pipeline step complete"
        );
    }

    debug!(
        steps = steps.len(),
        queries = queries.len(),
        "Pipeline evaluated in {:?}",
        start.elapsed()
    );
    Ok(current)
}
