// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Debate-round mechanics (§4.5 step 3): rank-priority speaking order,
//! rank-constraint violation detection, and the consensus-break red-team
//! trigger.

use archon_types::rank::Rank;
use archon_types::roster::{rank_priority_order, ArchonProfile};

use crate::models::{TranscriptEntry, VoteChoice};

/// Last K debate entries supplied as context to each speaker (§4.5 step 3).
pub const CONTEXT_HISTORY_DEPTH: usize = 10;

/// All 72 Archons in rank-priority debate order (§4.5 step 3).
pub fn speaking_order() -> Vec<&'static ArchonProfile> {
    rank_priority_order()
}

/// Crude pattern rule-set for detecting execution-detail speech from a
/// rank forbidden from producing it (§4.5 "Rank-constraint validation").
/// Looks for implementation-flavored vocabulary; a real rule-set would be
/// richer, but the contract is "detect, log, never reject the speech."
const EXECUTION_DETAIL_MARKERS: [&str; 6] =
    ["deploy", "implementation", "rollout plan", "migrate the", "configure the", "schema change"];

pub fn is_execution_detail_speech(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    EXECUTION_DETAIL_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Whether `speaker`'s speech is a rank-constraint violation (§4.5):
/// forbidden rank + execution-detail content.
pub fn is_rank_violation(rank: Rank, text: &str) -> bool {
    !rank.may_define_execution_details() && is_execution_detail_speech(text)
}

/// §4.5 "Consensus-break rule": true once more than 85% of recorded
/// stances agree, meaning the round needs a forced red-team rebuttal.
pub fn consensus_broken(stances: &[VoteChoice], threshold: f64) -> bool {
    if stances.is_empty() {
        return false;
    }
    let mut counts = std::collections::HashMap::new();
    for s in stances {
        *counts.entry(*s as u8).or_insert(0usize) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    (max as f64) / (stances.len() as f64) > threshold
}

/// Selects up to `n` Archons absent from `excluded` to argue the opposite
/// side, in stable rank-priority order (§4.5 "select N Archons to argue
/// the opposite side").
pub fn select_red_team(excluded: &[String], n: usize) -> Vec<&'static ArchonProfile> {
    speaking_order()
        .into_iter()
        .filter(|p| !excluded.contains(&p.id.get().to_string()))
        .take(n)
        .collect()
}

pub fn transcript_entry(motion_id: uuid::Uuid, round: i32, archon_id: &str, kind: &str, text: &str) -> TranscriptEntry {
    TranscriptEntry {
        motion_id,
        round,
        archon_id: archon_id.to_string(),
        kind: kind.to_string(),
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_rank_with_execution_detail_is_a_violation() {
        assert!(is_rank_violation(Rank::Knight, "we should deploy this to production tonight"));
        assert!(!is_rank_violation(Rank::King, "we should deploy this to production tonight"));
        assert!(!is_rank_violation(Rank::Knight, "I support this motion in principle"));
    }

    #[test]
    fn consensus_break_threshold() {
        let stances = vec![VoteChoice::Aye; 9]
            .into_iter()
            .chain(std::iter::once(VoteChoice::Nay))
            .collect::<Vec<_>>();
        assert!(consensus_broken(&stances, 0.85));
        let balanced = vec![VoteChoice::Aye, VoteChoice::Nay];
        assert!(!consensus_broken(&balanced, 0.85));
    }
}
