//! Intersection: precision-oriented filter over sibling rankings.
//!
//! Only keys reported by every operand survive. Their scores are summed
//! across operands; operands without a score for the key contribute nothing.
//!
//! # Ordering
//!
//! 1. Combined score, descending in IEEE total order (a key without any
//!    score sorts as 0.0)
//! 2. Best rank across all operands, ascending
//! 3. Position in the first operand

use crate::types::{DocumentKey, RankedList, ScoredRef};
use std::collections::HashMap;

struct Survivor<'a> {
    entry: &'a ScoredRef,
    score: Option<f32>,
    best_rank: usize,
    first_position: usize,
}

/// Keeps keys common to all `operands` and recombines their scores.
///
/// Returns an empty list when there are no operands or no common keys.
pub fn fuse(operands: &[&RankedList], k: Option<usize>) -> RankedList {
    let Some((first, rest)) = operands.split_first() else {
        return RankedList::new();
    };

    // key -> (rank, score) for every operand after the first
    let rest_ranks: Vec<HashMap<&DocumentKey, (usize, Option<f32>)>> = rest
        .iter()
        .map(|list| {
            list.iter()
                .enumerate()
                .map(|(idx, entry)| (&entry.key, (idx + 1, entry.score)))
                .collect()
        })
        .collect();

    let mut survivors: Vec<Survivor<'_>> = Vec::new();
    'candidates: for (position, entry) in first.iter().enumerate() {
        let mut score = entry.score;
        let mut best_rank = position + 1;

        for ranks in &rest_ranks {
            let Some(&(rank, other)) = ranks.get(&entry.key) else {
                continue 'candidates;
            };
            best_rank = best_rank.min(rank);
            score = add_scores(score, other);
        }

        survivors.push(Survivor {
            entry,
            score,
            best_rank,
            first_position: position,
        });
    }

    survivors.sort_by(|a, b| {
        let a_score = a.score.unwrap_or(0.0);
        let b_score = b.score.unwrap_or(0.0);
        b_score
            .total_cmp(&a_score)
            .then(a.best_rank.cmp(&b.best_rank))
            .then(a.first_position.cmp(&b.first_position))
    });

    let limit = k.unwrap_or(usize::MAX);
    survivors
        .into_iter()
        .take(limit)
        .map(|survivor| ScoredRef {
            key: survivor.entry.key.clone(),
            score: survivor.score,
            fields: survivor.entry.fields.clone(),
        })
        .collect()
}

fn add_scores(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}
