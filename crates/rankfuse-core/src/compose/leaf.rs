//! Leaf evaluation: the boundary between the engine and a [`Stage`].
//!
//! The engine, not the stage, guarantees the list invariants:
//! - queries whose candidate list is empty are answered with an empty list
//!   without calling the stage
//! - queries are handed over in chunks of `batch_size`
//! - outputs are restricted to candidate keys, de-duplicated and capped at `k`

use super::batch::check_len;
use crate::error::FusionError;
use crate::stage::{SearchOptions, Stage};
use crate::types::RankedList;
use tracing::{debug, warn};

pub(super) async fn evaluate(
    stage: &dyn Stage,
    queries: &[String],
    options: &SearchOptions,
    candidates: Option<&[RankedList]>,
) -> Result<Vec<RankedList>, FusionError> {
    if candidates.is_none() && stage.requires_candidates() {
        return Err(FusionError::MissingCandidates {
            stage: stage.name().to_string(),
        });
    }

    let mut results = vec![RankedList::new(); queries.len()];
    let active: Vec<usize> = (0..queries.len())
        .filter(|&idx| candidates.map_or(true, |lists| !lists[idx].is_empty()))
        .collect();
    if active.len() < queries.len() {
        debug!(
            stage = stage.name(),
            skipped = queries.len() - active.len(),
            "Empty candidate lists, skipping stage for those queries"
        );
    }

    let contiguous = active.len() == queries.len();
    for chunk in active.chunks(options.batch_size()) {
        let owned_queries: Vec<String>;
        let owned_candidates: Option<Vec<RankedList>>;
        let (chunk_queries, chunk_candidates): (&[String], Option<&[RankedList]>) = if contiguous {
            let range = chunk[0]..chunk[0] + chunk.len();
            (&queries[range.clone()], candidates.map(|lists| &lists[range]))
        } else {
            owned_queries = chunk.iter().map(|&idx| queries[idx].clone()).collect();
            owned_candidates =
                candidates.map(|lists| chunk.iter().map(|&idx| lists[idx].clone()).collect());
            (owned_queries.as_slice(), owned_candidates.as_deref())
        };

        let lists = stage
            .search_batch(chunk_queries, chunk_candidates, options)
            .await
            .map_err(|failure| FusionError::Stage {
                stage: stage.name().to_string(),
                index: chunk.get(failure.index).copied().unwrap_or(chunk[0]),
                source: failure.error,
            })?;
        check_len(stage.name(), chunk.len(), lists.len())?;

        for (&idx, list) in chunk.iter().zip(lists) {
            let candidate_list = candidates.map(|c| &c[idx]);
            results[idx] = normalize(stage.name(), list, candidate_list, options.k);
        }
    }

    Ok(results)
}

/// Enforces the ranked-list invariants on a stage's raw output.
fn normalize(
    stage: &str,
    list: RankedList,
    candidates: Option<&RankedList>,
    k: Option<usize>,
) -> RankedList {
    let mut entries = list.into_vec();

    if let Some(candidates) = candidates {
        let allowed = candidates.key_set();
        let before = entries.len();
        entries.retain(|entry| allowed.contains(&entry.key));
        if entries.len() < before {
            warn!(
                stage,
                dropped = before - entries.len(),
                "Stage returned keys outside its candidates"
            );
        }
    }

    let (mut list, duplicates) = RankedList::dedup_from(entries);
    if duplicates > 0 {
        warn!(stage, duplicates, "Stage returned duplicate keys");
    }
    if let Some(k) = k {
        list.truncate(k);
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{keys_of, list, FailingStage, RecordingStage, StaticStage};
    use crate::types::{DocumentKey, ScoredRef};

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_candidates_is_configuration_error() {
        let stage = StaticStage::new("ranker", list(&[1])).requiring_candidates();
        let err = evaluate(&stage, &queries(&["q"]), &SearchOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FusionError::MissingCandidates { .. }));
    }

    #[tokio::test]
    async fn test_empty_candidates_short_circuit() {
        let stage = RecordingStage::new("ranker", list(&[1, 2]));
        let candidates = vec![list(&[1]), RankedList::new(), list(&[2])];

        let results = evaluate(
            &stage,
            &queries(&["a", "b", "c"]),
            &SearchOptions::default(),
            Some(&candidates),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], list(&[1]));
        assert!(results[1].is_empty());
        assert_eq!(results[2], list(&[2]));
        assert_eq!(stage.seen_queries(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_chunks_by_batch_size() {
        let stage = RecordingStage::new("retriever", list(&[1]));
        let options = SearchOptions::default().batch_size_hint(2);

        let results = evaluate(&stage, &queries(&["a", "b", "c"]), &options, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(stage.batch_sizes(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_truncates_and_dedups() {
        let raw = vec![
            ScoredRef::scored(1, 1.0),
            ScoredRef::scored(1, 0.5),
            ScoredRef::scored(2, 0.4),
            ScoredRef::scored(3, 0.3),
        ];
        let stage = StaticStage::raw("dupes", raw);

        let results = evaluate(
            &stage,
            &queries(&["q"]),
            &SearchOptions::with_k(2),
            None,
        )
        .await
        .unwrap();

        assert_eq!(
            keys_of(&results[0]),
            vec![DocumentKey::from(1), DocumentKey::from(2)]
        );
        assert_eq!(results[0].as_slice()[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn test_failure_reports_absolute_index() {
        let stage = FailingStage::on_query("retriever", "bad");
        let options = SearchOptions::default().batch_size_hint(2);

        let err = evaluate(&stage, &queries(&["a", "b", "bad"]), &options, None)
            .await
            .unwrap_err();

        match err {
            FusionError::Stage { stage, index, .. } => {
                assert_eq!(stage, "retriever");
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
