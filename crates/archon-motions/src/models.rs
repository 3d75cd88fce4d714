// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{co_signs, motion_queue_entries, motions, petitions};

/// §3.5 `Motion.motion_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionType {
    Constitutional,
    Policy,
    Procedural,
    Open,
}

impl MotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionType::Constitutional => "constitutional",
            MotionType::Policy => "policy",
            MotionType::Procedural => "procedural",
            MotionType::Open => "open",
        }
    }
}

/// §3.5 `Motion.status` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStatus {
    Proposed,
    Seconded,
    Debating,
    Called,
    Voting,
    Passed,
    Failed,
    DiedNoSecond,
}

impl MotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionStatus::Proposed => "proposed",
            MotionStatus::Seconded => "seconded",
            MotionStatus::Debating => "debating",
            MotionStatus::Called => "called",
            MotionStatus::Voting => "voting",
            MotionStatus::Passed => "passed",
            MotionStatus::Failed => "failed",
            MotionStatus::DiedNoSecond => "died_no_second",
        }
    }
}

/// §3.5 `MotionQueueEntry.consensus_tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConsensusTier {
    Single,
    Low,
    Medium,
    High,
    Critical,
}

impl ConsensusTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusTier::Critical => "critical",
            ConsensusTier::High => "high",
            ConsensusTier::Medium => "medium",
            ConsensusTier::Low => "low",
            ConsensusTier::Single => "single",
        }
    }
}

/// §3.5 `MotionQueueEntry.status` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntryStatus {
    Pending,
    Endorsed,
    Promoted,
    Voted,
    Archived,
    Withdrawn,
    Deferred,
    Merged,
}

impl QueueEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryStatus::Pending => "pending",
            QueueEntryStatus::Endorsed => "endorsed",
            QueueEntryStatus::Promoted => "promoted",
            QueueEntryStatus::Voted => "voted",
            QueueEntryStatus::Archived => "archived",
            QueueEntryStatus::Withdrawn => "withdrawn",
            QueueEntryStatus::Deferred => "deferred",
            QueueEntryStatus::Merged => "merged",
        }
    }
}

/// §3.7 `Petition.petition_type`. Re-expressed here (rather than reused from
/// `archon_config::PetitionType`) because this crate's copy round-trips
/// through the database as text; `as_config_type` bridges the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetitionType {
    General,
    Cessation,
    Grievance,
    Collaboration,
    Meta,
}

impl PetitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetitionType::General => "general",
            PetitionType::Cessation => "cessation",
            PetitionType::Grievance => "grievance",
            PetitionType::Collaboration => "collaboration",
            PetitionType::Meta => "meta",
        }
    }

    pub fn as_config_type(&self) -> archon_config::PetitionType {
        match self {
            PetitionType::General => archon_config::PetitionType::General,
            PetitionType::Cessation => archon_config::PetitionType::Cessation,
            PetitionType::Grievance => archon_config::PetitionType::Grievance,
            PetitionType::Collaboration => archon_config::PetitionType::Collaboration,
            PetitionType::Meta => archon_config::PetitionType::Meta,
        }
    }
}

/// §3.7 `Petition.state` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetitionState {
    Received,
    Deliberating,
    Acknowledged,
    Referred,
    Escalated,
    Deferred,
    NoResponse,
    Adopted,
    Withdrawn,
}

impl PetitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetitionState::Received => "received",
            PetitionState::Deliberating => "deliberating",
            PetitionState::Acknowledged => "acknowledged",
            PetitionState::Referred => "referred",
            PetitionState::Escalated => "escalated",
            PetitionState::Deferred => "deferred",
            PetitionState::NoResponse => "no_response",
            PetitionState::Adopted => "adopted",
            PetitionState::Withdrawn => "withdrawn",
        }
    }
}

pub const ESCALATION_SOURCE_CO_SIGNER_THRESHOLD: &str = "CO_SIGNER_THRESHOLD";
pub const ESCALATION_SOURCE_DELIBERATION: &str = "DELIBERATION";
pub const ESCALATION_SOURCE_REFERRAL_TIMEOUT: &str = "REFERRAL_TIMEOUT";

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = motions)]
pub struct NewMotion {
    pub motion_id: Uuid,
    pub title: String,
    pub body: String,
    pub motion_type: String,
    pub proposer_id: String,
    pub seconder_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = motions, primary_key(motion_id))]
pub struct MotionRow {
    pub motion_id: Uuid,
    pub title: String,
    pub body: String,
    pub motion_type: String,
    pub proposer_id: String,
    pub seconder_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = motion_queue_entries)]
pub struct NewMotionQueueEntry {
    pub entry_id: Uuid,
    pub motion_id: Uuid,
    pub consensus_tier: String,
    pub endorsement_count: i32,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = motion_queue_entries, primary_key(entry_id))]
pub struct MotionQueueEntryRow {
    pub entry_id: Uuid,
    pub motion_id: Uuid,
    pub consensus_tier: String,
    pub endorsement_count: i32,
    pub status: String,
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = petitions)]
pub struct NewPetition {
    pub petition_id: Uuid,
    pub petition_type: String,
    pub body: String,
    pub submitter_id: Option<String>,
    pub state: String,
    pub content_hash: String,
    pub realm: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = petitions, primary_key(petition_id))]
pub struct PetitionRow {
    pub petition_id: Uuid,
    pub petition_type: String,
    pub body: String,
    pub submitter_id: Option<String>,
    pub state: String,
    pub content_hash: String,
    pub realm: String,
    pub co_signer_count: i32,
    pub escalation_source: Option<String>,
    pub adopted_as_motion_id: Option<Uuid>,
    pub adopted_by_king_id: Option<String>,
    pub adopted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = co_signs)]
pub struct NewCoSign {
    pub petition_id: Uuid,
    pub signer_id: String,
    pub identity_verified: bool,
    pub content_hash: String,
}
