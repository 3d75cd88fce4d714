// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Parliamentary Conclave: the full-roster debate/vote orchestrator
//! (§3.6, §4.5) that drives motions from the queue through debate, voting,
//! and tally.

pub mod checkpoint;
pub mod debate;
pub mod models;
pub mod schema;
pub mod session;
pub mod tally;
pub mod voting;

pub use debate::{select_red_team, speaking_order, CONTEXT_HISTORY_DEPTH};
pub use models::{
    ConclaveCheckpoint, ConclavePhase, ConclaveSessionRow, NewConclaveSession, TallyResult, TranscriptEntry,
    VoteChoice,
};
pub use session::{AdjournReconciliationHandler, ConclaveOrchestrator};
pub use tally::tally_votes;
pub use voting::collect_votes;
