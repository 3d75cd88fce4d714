// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The motion queue, petition intake pipeline, co-signing, and adoption
//! bridge (§3.5, §3.7, §3.8, §4.9, §4.10). `archon-conclave` and
//! `archon-fates` build their state machines on top of the aggregates
//! defined here; this crate owns no deliberation logic of its own.

pub mod adoption;
pub mod cosign;
pub mod escalation_check;
pub mod intake;
pub mod models;
pub mod motion;
pub mod motion_queue;
pub mod schema;

pub use adoption::AdoptionBridge;
pub use cosign::{CoSignResult, CoSignService};
pub use escalation_check::EscalationCheckHandler;
pub use intake::{petition_content_hash, PetitionIntake, PetitionSubmission};
pub use models::{
    ConsensusTier, MotionStatus, MotionType, PetitionState, PetitionType, QueueEntryStatus,
    ESCALATION_SOURCE_CO_SIGNER_THRESHOLD, ESCALATION_SOURCE_DELIBERATION,
    ESCALATION_SOURCE_REFERRAL_TIMEOUT,
};
pub use motion::MotionStore;
pub use motion_queue::MotionQueue;
