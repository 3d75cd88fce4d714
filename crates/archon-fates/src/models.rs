// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{deliberation_sessions, dissent_records};

/// §3.7 `DeliberationSession.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliberationPhase {
    Assess,
    Position,
    CrossExamine,
    Vote,
    Complete,
}

impl DeliberationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliberationPhase::Assess => "assess",
            DeliberationPhase::Position => "position",
            DeliberationPhase::CrossExamine => "cross_examine",
            DeliberationPhase::Vote => "vote",
            DeliberationPhase::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assess" => Some(DeliberationPhase::Assess),
            "position" => Some(DeliberationPhase::Position),
            "cross_examine" => Some(DeliberationPhase::CrossExamine),
            "vote" => Some(DeliberationPhase::Vote),
            "complete" => Some(DeliberationPhase::Complete),
            _ => None,
        }
    }
}

/// §3.7 `DeliberationSession.outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliberationOutcome {
    Acknowledge,
    Refer,
    Escalate,
    Defer,
    NoResponse,
}

impl DeliberationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliberationOutcome::Acknowledge => "acknowledge",
            DeliberationOutcome::Refer => "refer",
            DeliberationOutcome::Escalate => "escalate",
            DeliberationOutcome::Defer => "defer",
            DeliberationOutcome::NoResponse => "no_response",
        }
    }

    /// Parses one adjudicator's raw vote text (§4.6 phase 4). Anything that
    /// doesn't match a recognized disposition is treated the same way an
    /// ambiguous Conclave vote is (§4.5 step 4): default to the mildest
    /// disposition rather than reject the vote outright.
    pub fn parse_vote(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "acknowledge" | "ack" => DeliberationOutcome::Acknowledge,
            "refer" => DeliberationOutcome::Refer,
            "escalate" => DeliberationOutcome::Escalate,
            "defer" => DeliberationOutcome::Defer,
            "no_response" | "no-response" => DeliberationOutcome::NoResponse,
            _ => DeliberationOutcome::Defer,
        }
    }
}

pub const DEADLOCK_MAX_ROUNDS_EXCEEDED: &str = "DEADLOCK_MAX_ROUNDS_EXCEEDED";

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = deliberation_sessions)]
pub struct NewDeliberationSession {
    pub session_id: Uuid,
    pub petition_id: Uuid,
    pub adjudicator_1: String,
    pub adjudicator_2: String,
    pub adjudicator_3: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = deliberation_sessions, primary_key(session_id))]
pub struct DeliberationSessionRow {
    pub session_id: Uuid,
    pub petition_id: Uuid,
    pub adjudicator_1: String,
    pub adjudicator_2: String,
    pub adjudicator_3: String,
    pub phase: String,
    pub phase_transcript_hashes: serde_json::Value,
    pub votes: serde_json::Value,
    pub outcome: Option<String>,
    pub dissent_adjudicator_id: Option<String>,
    pub round_count: i32,
    pub votes_by_round: serde_json::Value,
    pub is_deadlocked: bool,
    pub deadlock_reason: Option<String>,
    pub timeout_job_id: Option<i64>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub timed_out: bool,
    pub version: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DeliberationSessionRow {
    pub fn adjudicators(&self) -> [String; 3] {
        [self.adjudicator_1.clone(), self.adjudicator_2.clone(), self.adjudicator_3.clone()]
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dissent_records)]
pub struct NewDissentRecord {
    pub session_id: Uuid,
    pub petition_id: Uuid,
    pub dissent_adjudicator_id: String,
    pub dissent_disposition: String,
    pub majority_disposition: String,
    pub rationale: String,
    pub rationale_hash: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = dissent_records, primary_key(session_id, petition_id))]
pub struct DissentRecordRow {
    pub session_id: Uuid,
    pub petition_id: Uuid,
    pub dissent_adjudicator_id: String,
    pub dissent_disposition: String,
    pub majority_disposition: String,
    pub rationale: String,
    pub rationale_hash: String,
    pub recorded_at: DateTime<Utc>,
}
