//! Vote: weighted reciprocal rank fusion.
//!
//! Formula: `score(d) = occurrences(d) * sum_{r} 1 / rank_r(d)`
//!
//! Where:
//! - `occurrences(d)` is the number of operands that returned `d`
//! - `rank_r(d)` is the 1-indexed position of `d` in operand `r`
//!
//! Unlike plain RRF there is no smoothing constant and the sum is multiplied
//! by the number of agreeing operands, so documents several models agree on
//! dominate. Raw model scores are ignored, which makes it safe to vote over
//! models whose scores live on unrelated scales, and to nest votes.
//!
//! # Ordering
//!
//! 1. Vote score, descending
//! 2. Smallest rank the key reached in any operand
//! 3. Operand declaration order (first operand containing the key, then its
//!    rank there)

use crate::types::{Document, DocumentKey, RankedList, ScoredRef};
use std::collections::HashMap;

struct Tally<'a> {
    key: &'a DocumentKey,
    fields: Option<&'a Document>,
    occurrences: usize,
    reciprocal_sum: f32,
    min_rank: usize,
}

impl Tally<'_> {
    fn score(&self) -> f32 {
        self.occurrences as f32 * self.reciprocal_sum
    }
}

/// Fuses `operands` by weighted reciprocal rank.
pub fn fuse(operands: &[&RankedList], k: Option<usize>) -> RankedList {
    // Tallies are stored in first-seen order, which is exactly the
    // declaration-order tie-breaker.
    let mut tallies: Vec<Tally<'_>> = Vec::new();
    let mut index: HashMap<&DocumentKey, usize> = HashMap::new();

    for list in operands {
        for (position, entry) in list.iter().enumerate() {
            let rank = position + 1;
            let slot = *index.entry(&entry.key).or_insert_with(|| {
                tallies.push(Tally {
                    key: &entry.key,
                    fields: entry.fields.as_ref(),
                    occurrences: 0,
                    reciprocal_sum: 0.0,
                    min_rank: rank,
                });
                tallies.len() - 1
            });

            let tally = &mut tallies[slot];
            tally.occurrences += 1;
            tally.reciprocal_sum += 1.0 / rank as f32;
            tally.min_rank = tally.min_rank.min(rank);
        }
    }

    let mut ordered: Vec<(usize, f32)> = tallies
        .iter()
        .enumerate()
        .map(|(first_seen, tally)| (first_seen, tally.score()))
        .collect();
    ordered.sort_by(|(a_seen, a_score), (b_seen, b_score)| {
        b_score
            .total_cmp(a_score)
            .then(tallies[*a_seen].min_rank.cmp(&tallies[*b_seen].min_rank))
            .then(a_seen.cmp(b_seen))
    });

    let limit = k.unwrap_or(usize::MAX);
    ordered
        .into_iter()
        .take(limit)
        .map(|(slot, score)| {
            let tally = &tallies[slot];
            ScoredRef {
                key: tally.key.clone(),
                score: Some(score),
                fields: tally.fields.cloned(),
            }
        })
        .collect()
}
