// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diesel table definitions for the `jobs` schema (§3.9, §4.7).

diesel::table! {
    jobs.scheduled_jobs (id) {
        id -> BigInt,
        job_type -> Text,
        payload -> Jsonb,
        scheduled_for -> Timestamptz,
        status -> Text,
        attempts -> Integer,
        last_attempt_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    jobs.dead_letter_jobs (id) {
        id -> BigInt,
        original_job_id -> BigInt,
        job_type -> Text,
        payload -> Jsonb,
        attempts -> Integer,
        failure_reason -> Text,
        failed_at -> Timestamptz,
    }
}
