// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definitions for the motion-queue and petition-intake
//! portion of the `public` schema (§3.5, §3.7, §3.8).

diesel::table! {
    public.motions (motion_id) {
        motion_id -> Uuid,
        title -> Text,
        body -> Text,
        motion_type -> Text,
        proposer_id -> Text,
        seconder_id -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    public.motion_queue_entries (entry_id) {
        entry_id -> Uuid,
        motion_id -> Uuid,
        consensus_tier -> Text,
        endorsement_count -> Integer,
        status -> Text,
        session_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    public.petitions (petition_id) {
        petition_id -> Uuid,
        petition_type -> Text,
        body -> Text,
        submitter_id -> Nullable<Text>,
        state -> Text,
        content_hash -> Text,
        realm -> Text,
        co_signer_count -> Integer,
        escalation_source -> Nullable<Text>,
        adopted_as_motion_id -> Nullable<Uuid>,
        adopted_by_king_id -> Nullable<Text>,
        adopted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    public.co_signs (petition_id, signer_id) {
        petition_id -> Uuid,
        signer_id -> Text,
        signed_at -> Timestamptz,
        identity_verified -> Bool,
        content_hash -> Text,
    }
}

diesel::table! {
    public.submission_rate_buckets (submitter_id, bucket_minute) {
        submitter_id -> Text,
        bucket_minute -> BigInt,
        submissions -> Integer,
    }
}

diesel::table! {
    public.cosign_rate_buckets (signer_id, bucket_minute) {
        signer_id -> Text,
        bucket_minute -> BigInt,
        cosigns -> Integer,
    }
}

diesel::joinable!(motion_queue_entries -> motions (motion_id));
diesel::allow_tables_to_appear_in_same_query!(motions, motion_queue_entries);
