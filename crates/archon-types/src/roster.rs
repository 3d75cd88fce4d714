// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::rank::Rank;

/// Stable, dense identifier for one of the 72 Archons. `1..=72`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchonId(pub u8);

impl ArchonId {
    pub fn get(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchonProfile {
    pub id: ArchonId,
    pub name: String,
    pub rank: Rank,
    pub branch: Branch,
}

/// Fixed rank distribution across the 72 seats. Sums to 72; the bottom tier
/// (Prince/Earl/Knight) is twice as large as the others, matching §4.5's
/// grouping of those three ranks into a single debate-priority band.
const RANK_DISTRIBUTION: [(Rank, usize); 7] = [
    (Rank::King, 9),
    (Rank::Duke, 9),
    (Rank::Marquis, 9),
    (Rank::President, 9),
    (Rank::Prince, 12),
    (Rank::Earl, 12),
    (Rank::Knight, 12),
];

const ARCHON_BRANCHES: [Branch; 7] = [
    Branch::Legislative,
    Branch::Executive,
    Branch::AdministrativeSenior,
    Branch::AdministrativeStrategic,
    Branch::Judicial,
    Branch::Advisory,
    Branch::Witness,
];

fn build_roster() -> Vec<ArchonProfile> {
    let mut roster = Vec::with_capacity(72);
    let mut next_id: u8 = 1;
    for (rank, count) in RANK_DISTRIBUTION {
        for i in 0..count {
            let branch = ARCHON_BRANCHES[(next_id as usize - 1) % ARCHON_BRANCHES.len()];
            roster.push(ArchonProfile {
                id: ArchonId(next_id),
                name: format!("archon-{next_id:02}-{rank}-{i:02}"),
                rank,
                branch,
            });
            next_id += 1;
        }
    }
    debug_assert_eq!(roster.len(), 72);
    roster
}

pub static ROSTER: Lazy<Vec<ArchonProfile>> = Lazy::new(build_roster);

pub fn profile(id: ArchonId) -> Option<&'static ArchonProfile> {
    ROSTER.iter().find(|p| p.id == id)
}

/// All 72 Archons in rank-priority debate order (§4.5), ties broken by
/// stable participant id order.
pub fn rank_priority_order() -> Vec<&'static ArchonProfile> {
    let mut ordered: Vec<&ArchonProfile> = ROSTER.iter().collect();
    ordered.sort_by_key(|p| (p.rank.priority_band(), p.id));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_has_exactly_72_distinct_seats() {
        assert_eq!(ROSTER.len(), 72);
        let mut ids: Vec<u8> = ROSTER.iter().map(|p| p.id.0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 72);
    }

    #[test]
    fn priority_order_groups_bottom_tier_together() {
        let order = rank_priority_order();
        assert_eq!(order.first().unwrap().rank, Rank::King);
        let bands: Vec<u8> = order.iter().map(|p| p.rank.priority_band()).collect();
        assert!(bands.windows(2).all(|w| w[0] <= w[1]));
    }
}
