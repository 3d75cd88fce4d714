// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The durable job queue, poller, and dead-letter queue (§3.9, §4.7).
//! Single-database, `SELECT ... FOR UPDATE SKIP LOCKED`, at-least-once
//! delivery; handlers are responsible for their own idempotency.

pub mod handler;
pub mod models;
pub mod queue;
pub mod schema;
pub mod worker;

pub use handler::JobHandler;
pub use models::{
    JobStatus, ScheduledJobRow, JOB_TYPE_ADJOURN_RECONCILIATION, JOB_TYPE_DELIBERATION_TIMEOUT,
    JOB_TYPE_ESCALATION_CHECK, JOB_TYPE_REFERRAL_TIMEOUT,
};
pub use queue::JobQueue;
pub use worker::JobWorker;
