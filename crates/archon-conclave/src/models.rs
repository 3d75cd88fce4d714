// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::conclave_sessions;

/// §3.6 `ConclaveSession.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConclavePhase {
    NotStarted,
    CallToOrder,
    RollCall,
    NewBusiness,
    Adjournment,
    Adjourned,
    Halted,
}

impl ConclavePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConclavePhase::NotStarted => "not_started",
            ConclavePhase::CallToOrder => "call_to_order",
            ConclavePhase::RollCall => "roll_call",
            ConclavePhase::NewBusiness => "new_business",
            ConclavePhase::Adjournment => "adjournment",
            ConclavePhase::Adjourned => "adjourned",
            ConclavePhase::Halted => "halted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(ConclavePhase::NotStarted),
            "call_to_order" => Some(ConclavePhase::CallToOrder),
            "roll_call" => Some(ConclavePhase::RollCall),
            "new_business" => Some(ConclavePhase::NewBusiness),
            "adjournment" => Some(ConclavePhase::Adjournment),
            "adjourned" => Some(ConclavePhase::Adjourned),
            "halted" => Some(ConclavePhase::Halted),
            _ => None,
        }
    }
}

/// §4.5 step 4: a present participant's raw vote on one motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteChoice {
    Aye,
    Nay,
    Abstain,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::Aye => "AYE",
            VoteChoice::Nay => "NAY",
            VoteChoice::Abstain => "ABSTAIN",
        }
    }

    /// Parses a raw agent vote response. Ambiguous text defaults to
    /// `ABSTAIN` rather than rejecting the vote (§4.5 step 4).
    pub fn parse_response(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AYE" | "YEA" | "YES" => VoteChoice::Aye,
            "NAY" | "NO" => VoteChoice::Nay,
            _ => VoteChoice::Abstain,
        }
    }
}

/// §4.5 step 5 outcome for one motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyResult {
    Passed,
    Failed,
}

/// One transcript entry: a debate speech, a vote, or a system/error note
/// (§4.5 "Error conditions").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub motion_id: Uuid,
    pub round: i32,
    pub archon_id: String,
    pub kind: String,
    pub text: String,
}

/// Persisted after each debate round and after each vote (§4.5
/// "Checkpoints"). Resuming a session replays from this rather than
/// recomputing derived indexes from the full transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConclaveCheckpoint {
    pub phase: String,
    pub current_motion_id: Option<Uuid>,
    pub debate_round: i32,
    pub transcript_len: usize,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = conclave_sessions)]
pub struct NewConclaveSession {
    pub session_id: Uuid,
    pub phase: String,
    pub present_archons: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = conclave_sessions, primary_key(session_id))]
pub struct ConclaveSessionRow {
    pub session_id: Uuid,
    pub phase: String,
    pub present_archons: serde_json::Value,
    pub transcript: serde_json::Value,
    pub votes: serde_json::Value,
    pub checkpoint: Option<serde_json::Value>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConclaveSessionRow {
    pub fn present_ids(&self) -> Vec<String> {
        self.present_archons
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn checkpoint_value(&self) -> Option<ConclaveCheckpoint> {
        self.checkpoint.as_ref().and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
