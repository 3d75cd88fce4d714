// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definitions for the Three-Fates deliberation tables
//! (§3.7, §4.6).

diesel::table! {
    public.deliberation_sessions (session_id) {
        session_id -> Uuid,
        petition_id -> Uuid,
        adjudicator_1 -> Text,
        adjudicator_2 -> Text,
        adjudicator_3 -> Text,
        phase -> Text,
        phase_transcript_hashes -> Jsonb,
        votes -> Jsonb,
        outcome -> Nullable<Text>,
        dissent_adjudicator_id -> Nullable<Text>,
        round_count -> Integer,
        votes_by_round -> Jsonb,
        is_deadlocked -> Bool,
        deadlock_reason -> Nullable<Text>,
        timeout_job_id -> Nullable<BigInt>,
        timeout_at -> Nullable<Timestamptz>,
        timed_out -> Bool,
        version -> BigInt,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    public.dissent_records (session_id, petition_id) {
        session_id -> Uuid,
        petition_id -> Uuid,
        dissent_adjudicator_id -> Text,
        dissent_disposition -> Text,
        majority_disposition -> Text,
        rationale -> Text,
        rationale_hash -> Text,
        recorded_at -> Timestamptz,
    }
}
