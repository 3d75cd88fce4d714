// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{agent_keys, events, merkle_epochs};

/// A fully-formed event row, ready for `INSERT` (§4.1). All fields are
/// computed by the caller before reaching this layer — this struct does
/// not derive anything itself, the hash chain trigger is the last line
/// of defense, not the first.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub branch: String,
    pub schema_version: String,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub content_hash: String,
    pub hash_alg_version: i16,
    pub sig_alg_version: i16,
    pub agent_id: String,
    pub witness_id: String,
    pub signature: String,
    pub signing_key_id: String,
    pub witness_signature: String,
    pub local_timestamp: DateTime<Utc>,
    pub authority_timestamp: DateTime<Utc>,
    pub is_terminal: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
pub struct StoredEvent {
    pub sequence: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub branch: String,
    pub schema_version: String,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub content_hash: String,
    pub hash_alg_version: i16,
    pub sig_alg_version: i16,
    pub agent_id: String,
    pub witness_id: String,
    pub signature: String,
    pub signing_key_id: String,
    pub witness_signature: String,
    pub local_timestamp: DateTime<Utc>,
    pub authority_timestamp: DateTime<Utc>,
    pub is_terminal: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agent_keys)]
pub struct NewAgentKey {
    pub key_id: String,
    pub agent_id: String,
    pub public_key: Vec<u8>,
    pub active_from: DateTime<Utc>,
    pub active_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = agent_keys)]
pub struct StoredAgentKey {
    pub key_id: String,
    pub agent_id: String,
    pub public_key: Vec<u8>,
    pub active_from: DateTime<Utc>,
    pub active_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable, Queryable, Selectable)]
#[diesel(table_name = merkle_epochs)]
pub struct MerkleEpochRow {
    pub epoch_id: i64,
    pub start_sequence: i64,
    pub end_sequence: i64,
    pub algorithm: String,
    pub root_hash: String,
    pub event_count: i64,
    pub root_event_id: Uuid,
}
