// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::{dead_letter_jobs, scheduled_jobs};

/// Required job types (§4.7). Handlers register against these constants
/// rather than free-form strings so a typo in a job type doesn't silently
/// create an un-handled job kind.
pub const JOB_TYPE_REFERRAL_TIMEOUT: &str = "referral_timeout";
pub const JOB_TYPE_DELIBERATION_TIMEOUT: &str = "deliberation_timeout";
pub const JOB_TYPE_ESCALATION_CHECK: &str = "escalation_check";
pub const JOB_TYPE_ADJOURN_RECONCILIATION: &str = "adjourn_reconciliation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scheduled_jobs)]
pub struct NewScheduledJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub scheduled_for: DateTime<Utc>,
}

/// A job row as claimed by a worker (§4.7 worker loop).
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = scheduled_jobs)]
pub struct ScheduledJobRow {
    pub id: i64,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub scheduled_for: DateTime<Utc>,
    pub status: String,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dead_letter_jobs)]
pub struct NewDeadLetterJob {
    pub original_job_id: i64,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub failure_reason: String,
}
