use crate::types::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of counting one round's votes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    /// Set only when exactly one target reached `max_votes`
    pub winner: Option<UserId>,
    /// Non-abstaining votes per target
    pub vote_counts: BTreeMap<UserId, u32>,
    /// Zero when nobody named a target
    pub max_votes: u32,
    pub abstentions: u32,
}

/// Plurality count; a tie at the top means no winner.
///
/// The result is independent of the order of `votes`.
pub fn tally(votes: &[Vote]) -> Tally {
    let mut vote_counts: BTreeMap<UserId, u32> = BTreeMap::new();
    let mut abstentions = 0;

    for vote in votes {
        match &vote.target_id {
            Some(target) => *vote_counts.entry(target.clone()).or_insert(0) += 1,
            None => abstentions += 1,
        }
    }

    let max_votes = vote_counts.values().copied().max().unwrap_or(0);
    let mut leaders = vote_counts
        .iter()
        .filter(|(_, count)| **count == max_votes && max_votes > 0)
        .map(|(user_id, _)| user_id);

    let winner = match (leaders.next(), leaders.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    };

    Tally {
        winner,
        vote_counts,
        max_votes,
        abstentions,
    }
}
