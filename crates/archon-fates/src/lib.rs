// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Three-Fates petition deliberation engine (§3.7, §4.6): a 3-Judicial-
//! adjudicator panel that assesses, debates, cross-examines, and votes on
//! every escalated petition, recording dissent and deadlocking defensively
//! rather than looping forever.

pub mod deliberation;
pub mod models;
pub mod schema;
pub mod selection;

pub use deliberation::{DeliberationTimeoutHandler, ReferralTimeoutHandler, ThreeFates};
pub use models::{
    DeliberationOutcome, DeliberationPhase, DeliberationSessionRow, DissentRecordRow, NewDeliberationSession,
    NewDissentRecord, DEADLOCK_MAX_ROUNDS_EXCEEDED,
};
pub use selection::select_adjudicators;
