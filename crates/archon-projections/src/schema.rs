// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definitions for the `projections` schema (§3.10, §4.8).

diesel::table! {
    projections.projection_checkpoints (projection_name) {
        projection_name -> Text,
        last_event_id -> Nullable<Uuid>,
        last_hash -> Nullable<Text>,
        last_sequence -> BigInt,
    }
}

diesel::table! {
    projections.projection_applies (projection_name, event_id) {
        projection_name -> Text,
        event_id -> Uuid,
        applied_at -> Timestamptz,
    }
}

diesel::table! {
    projections.task_states (task_id) {
        task_id -> Text,
        state -> Jsonb,
        last_event_sequence -> BigInt,
        last_event_hash -> Text,
    }
}

diesel::table! {
    projections.legitimacy_states (subject_id) {
        subject_id -> Text,
        state -> Jsonb,
        last_event_sequence -> BigInt,
        last_event_hash -> Text,
    }
}

diesel::table! {
    projections.panel_registry (panel_id) {
        panel_id -> Text,
        state -> Jsonb,
        last_event_sequence -> BigInt,
        last_event_hash -> Text,
    }
}

diesel::table! {
    projections.petition_index (petition_id) {
        petition_id -> Uuid,
        state -> Jsonb,
        last_event_sequence -> BigInt,
        last_event_hash -> Text,
    }
}

diesel::table! {
    projections.actor_registry (agent_id) {
        agent_id -> Text,
        state -> Jsonb,
        last_event_sequence -> BigInt,
        last_event_hash -> Text,
    }
}
