// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hierarchical class of an Archon (glossary: "Rank").
///
/// Ordered by debate priority per §4.5: Kings speak first, then Dukes, then
/// Marquises, then Presidents, then the Prince/Earl/Knight tier (which shares
/// a single priority band and is broken by stable participant id order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    King,
    Duke,
    Marquis,
    President,
    Prince,
    Earl,
    Knight,
}

impl Rank {
    /// Debate priority band: lower sorts first. Prince/Earl/Knight share a
    /// band per §4.5 ("Princes/Earls/Knights" grouped together).
    pub fn priority_band(&self) -> u8 {
        match self {
            Rank::King => 0,
            Rank::Duke => 1,
            Rank::Marquis => 2,
            Rank::President => 3,
            Rank::Prince | Rank::Earl | Rank::Knight => 4,
        }
    }

    /// Whether this rank is forbidden from defining execution details in
    /// debate speech (§4.5 "Rank-constraint validation"). Only the senior
    /// deliberative tiers may speak to implementation specifics; the
    /// field tier (Prince/Earl/Knight) is restricted to position-taking.
    pub fn may_define_execution_details(&self) -> bool {
        !matches!(self, Rank::Prince | Rank::Earl | Rank::Knight)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rank::King => "king",
            Rank::Duke => "duke",
            Rank::Marquis => "marquis",
            Rank::President => "president",
            Rank::Prince => "prince",
            Rank::Earl => "earl",
            Rank::Knight => "knight",
        };
        f.write_str(s)
    }
}
