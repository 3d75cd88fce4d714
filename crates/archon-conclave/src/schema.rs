// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definition for `conclave_sessions` (§3.6, §4.5).

diesel::table! {
    public.conclave_sessions (session_id) {
        session_id -> Uuid,
        phase -> Text,
        present_archons -> Jsonb,
        transcript -> Jsonb,
        votes -> Jsonb,
        checkpoint -> Nullable<Jsonb>,
        version -> BigInt,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
