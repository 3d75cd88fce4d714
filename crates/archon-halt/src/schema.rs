// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definition for `public.halt_state`. `archon-ledger` also
//! declares this table (read-only, to gate `append`); this crate owns the
//! write path. Both declarations point at the same migration-defined table.

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
