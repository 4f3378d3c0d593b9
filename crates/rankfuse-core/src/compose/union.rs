//! Union: recall-oriented merge of sibling rankings.
//!
//! Operands are concatenated in declaration order and only the first
//! occurrence of each key survives, so a key emitted by a higher-priority
//! operand is never displaced by a lower-priority duplicate.

use crate::types::{RankedList, ScoredRef};

/// Merges `operands` (highest priority first), keeping first occurrences.
///
/// The surviving entry keeps its original score and fields. The output has at
/// most `k` entries when `k` is set.
pub fn fuse(operands: &[&RankedList], k: Option<usize>) -> RankedList {
    let concatenated: Vec<ScoredRef> = operands
        .iter()
        .flat_map(|list| list.iter().cloned())
        .collect();

    let (mut merged, duplicates) = RankedList::dedup_from(concatenated);
    if let Some(k) = k {
        merged.truncate(k);
    }

    tracing::trace!(
        operands = operands.len(),
        duplicates,
        results = merged.len(),
        "union fused"
    );
    merged
}
