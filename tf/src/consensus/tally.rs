//! Vote tallying and tie detection
//!
//! Pure aggregation over vote records. All consistency reasoning assumes
//! the per-trip sequencer has serialized the writes these reads see.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{Member, Vote};

/// Aggregated count for one choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteCount {
    pub choice: String,
    pub count: usize,
}

/// Minimum vote count to close a poll: `ceil(member_count * 0.6)`.
///
/// Recompute from the fresh member count on every check: a member joining
/// mid-poll raises the bar, never lowers it.
pub fn majority_threshold(member_count: usize) -> usize {
    (member_count * 3).div_ceil(5)
}

/// Aggregate votes into per-choice counts, sorted descending.
///
/// Choice name is the secondary sort key so equal counts order
/// deterministically.
pub fn results(votes: &[Vote]) -> Vec<VoteCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.choice.as_str()).or_default() += 1;
    }

    let mut out: Vec<VoteCount> = counts
        .into_iter()
        .map(|(choice, count)| VoteCount { choice: choice.to_string(), count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.choice.cmp(&b.choice)));
    out
}

/// True when two or more choices share the maximum count.
///
/// A tie suppresses poll closure even when the threshold is met.
pub fn is_tie(results: &[VoteCount]) -> bool {
    results.len() >= 2 && results[0].count == results[1].count
}

/// Members who have not cast a ballot yet
pub fn pending_voters<'a>(members: &'a [Member], votes: &[Vote]) -> Vec<&'a Member> {
    members
        .iter()
        .filter(|m| !votes.iter().any(|v| v.member_id == m.id))
        .collect()
}
