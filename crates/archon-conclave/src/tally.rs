// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Supermajority tally (§4.5 step 5).

use std::collections::HashMap;

use archon_motions::MotionType;

use crate::models::{TallyResult, VoteChoice};

/// `yeas >= ceil(numerator*(yeas+nays)/denominator)` for constitutional/
/// policy motions (default 2/3); procedural motions pass on simple majority
/// of non-abstaining voters (§4.5 step 5, "procedural motions may use
/// simple majority (config)").
pub fn tally_votes(
    votes: &HashMap<String, VoteChoice>,
    motion_type: MotionType,
    supermajority_numerator: u32,
    supermajority_denominator: u32,
) -> (TallyResult, i64, i64, i64) {
    let mut yeas = 0i64;
    let mut nays = 0i64;
    let mut abstains = 0i64;
    for choice in votes.values() {
        match choice {
            VoteChoice::Aye => yeas += 1,
            VoteChoice::Nay => nays += 1,
            VoteChoice::Abstain => abstains += 1,
        }
    }

    let passed = if motion_type == MotionType::Procedural {
        yeas > nays
    } else {
        let decided = yeas + nays;
        let threshold = (supermajority_numerator as i64 * decided).div_ceil(supermajority_denominator as i64);
        yeas >= threshold
    };

    let result = if passed { TallyResult::Passed } else { TallyResult::Failed };
    (result, yeas, nays, abstains)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(aye: usize, nay: usize, abstain: usize) -> HashMap<String, VoteChoice> {
        let mut m = HashMap::new();
        for i in 0..aye {
            m.insert(format!("aye-{i}"), VoteChoice::Aye);
        }
        for i in 0..nay {
            m.insert(format!("nay-{i}"), VoteChoice::Nay);
        }
        for i in 0..abstain {
            m.insert(format!("abstain-{i}"), VoteChoice::Abstain);
        }
        m
    }

    #[test]
    fn exact_two_thirds_passes() {
        let (result, yeas, nays, _) = tally_votes(&votes(2, 1, 0), MotionType::Constitutional, 2, 3);
        assert_eq!(result, TallyResult::Passed);
        assert_eq!(yeas, 2);
        assert_eq!(nays, 1);
    }

    #[test]
    fn just_under_two_thirds_fails() {
        let (result, ..) = tally_votes(&votes(4, 3, 0), MotionType::Policy, 2, 3);
        assert_eq!(result, TallyResult::Failed);
    }

    #[test]
    fn procedural_motion_uses_simple_majority() {
        let (result, ..) = tally_votes(&votes(3, 2, 1), MotionType::Procedural, 2, 3);
        assert_eq!(result, TallyResult::Passed);
    }
}
