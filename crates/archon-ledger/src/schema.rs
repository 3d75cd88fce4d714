// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definitions for the `ledger` schema. Hand-written rather
//! than generated by `diesel print-schema` since the migrations are the
//! single source of truth and this crate owns both.

diesel::table! {
    ledger.events (sequence) {
        sequence -> BigInt,
        event_id -> Uuid,
        event_type -> Text,
        branch -> Text,
        schema_version -> Text,
        payload -> Jsonb,
        prev_hash -> Text,
        content_hash -> Text,
        hash_alg_version -> SmallInt,
        sig_alg_version -> SmallInt,
        agent_id -> Text,
        witness_id -> Text,
        signature -> Text,
        signing_key_id -> Text,
        witness_signature -> Text,
        local_timestamp -> Timestamptz,
        authority_timestamp -> Timestamptz,
        is_terminal -> Bool,
    }
}

diesel::table! {
    ledger.agent_keys (key_id) {
        key_id -> Text,
        agent_id -> Text,
        public_key -> Bytea,
        active_from -> Timestamptz,
        active_until -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ledger.merkle_epochs (epoch_id) {
        epoch_id -> BigInt,
        start_sequence -> BigInt,
        end_sequence -> BigInt,
        algorithm -> Text,
        root_hash -> Text,
        event_count -> BigInt,
        root_event_id -> Uuid,
    }
}

diesel::table! {
    ledger.clock_drift_observations (id) {
        id -> BigInt,
        event_id -> Uuid,
        local_timestamp -> Timestamptz,
        authority_timestamp -> Timestamptz,
        drift_seconds -> Double,
        observed_at -> Timestamptz,
    }
}

diesel::table! {
    public.halt_state (id) {
        id -> SmallInt,
        is_halted -> Bool,
        reason -> Nullable<Text>,
        crisis_event_id -> Nullable<Uuid>,
        halted_at -> Nullable<Timestamptz>,
        cleared_at -> Nullable<Timestamptz>,
        ceremony_id -> Nullable<Text>,
    }
}
