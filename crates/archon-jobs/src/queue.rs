// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The durable job queue (§4.7): `SELECT ... FOR UPDATE SKIP LOCKED` claim,
//! exponential-backoff retry, and dead-letter on exhaustion. A halted system
//! pauses the poll loop but never mutates a job row while halted (§4.4
//! "Effect on other components").

use std::time::Duration as StdDuration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use archon_types::{ArchonError, ArchonResult};

use crate::models::{JobStatus, NewDeadLetterJob, NewScheduledJob, ScheduledJobRow};
use crate::schema::{dead_letter_jobs, scheduled_jobs};
use archon_ledger::PgPool;

/// Exponential backoff bounds for job retry scheduling (§5 "Cancellation &
/// timeouts": "base 1s -> cap 60s"), reused here for job retry delay even
/// though that clause is written about agent-invocation retries — the same
/// policy is the natural one for job retries.
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 60;

/// Exponential backoff with zero jitter, so the delay for a given attempt
/// count is deterministic: `base * 2^attempts`, clamped at `cap`.
fn backoff_delay(attempts: i32) -> ChronoDuration {
    let mut policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(StdDuration::from_secs(BACKOFF_BASE_SECS))
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(StdDuration::from_secs(BACKOFF_CAP_SECS))
        .with_max_elapsed_time(None)
        .build();
    let steps = attempts.max(0).min(6);
    let mut delay = StdDuration::from_secs(BACKOFF_BASE_SECS);
    for _ in 0..=steps {
        delay = policy.next_backoff().unwrap_or(StdDuration::from_secs(BACKOFF_CAP_SECS));
    }
    ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(BACKOFF_CAP_SECS as i64))
}

#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        JobQueue { pool }
    }

    async fn conn(
        &self,
    ) -> ArchonResult<diesel_async::pooled_connection::bb8::PooledConnection<'_, diesel_async::AsyncPgConnection>>
    {
        self.pool
            .get()
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to acquire connection: {e}")))
    }

    /// §4.7 `enqueue(job_type, payload, scheduled_for)`.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        scheduled_for: DateTime<Utc>,
    ) -> ArchonResult<i64> {
        let mut conn = self.conn().await?;
        let id: i64 = diesel::insert_into(scheduled_jobs::table)
            .values(NewScheduledJob {
                job_type: job_type.to_string(),
                payload,
                scheduled_for,
            })
            .returning(scheduled_jobs::id)
            .get_result(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to enqueue job: {e}")))?;
        Ok(id)
    }

    /// Claims up to `batch_size` due, pending jobs via `SELECT ... FOR
    /// UPDATE SKIP LOCKED` and marks them `processing` in the same
    /// transaction (§4.7 worker loop). Returns an empty batch, never an
    /// error, when nothing is due — an empty poll is not a failure.
    pub async fn claim_batch(&self, batch_size: i64) -> ArchonResult<Vec<ScheduledJobRow>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                let now = Utc::now();
                let claimed: Vec<ScheduledJobRow> = scheduled_jobs::table
                    .filter(scheduled_jobs::status.eq(JobStatus::Pending.as_str()))
                    .filter(scheduled_jobs::scheduled_for.le(now))
                    .order(scheduled_jobs::scheduled_for.asc())
                    .limit(batch_size)
                    .for_update()
                    .skip_locked()
                    .load(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to claim jobs: {e}")))?;

                for job in &claimed {
                    diesel::update(scheduled_jobs::table.find(job.id))
                        .set((
                            scheduled_jobs::status.eq(JobStatus::Processing.as_str()),
                            scheduled_jobs::last_attempt_at.eq(Some(now)),
                        ))
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to mark job processing: {e}")))?;
                }

                Ok(claimed)
            }
            .scope_boxed()
        })
        .await
    }

    /// Marks a job `completed` (§4.7 "on success mark completed").
    pub async fn complete(&self, job_id: i64) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(scheduled_jobs::table.find(job_id))
            .set(scheduled_jobs::status.eq(JobStatus::Completed.as_str()))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to complete job: {e}")))?;
        Ok(())
    }

    /// Records a handler failure (§4.7 "on failure increment attempts,
    /// reschedule with exponential backoff; on attempts == max_attempts
    /// insert into DLQ and mark failed").
    pub async fn fail(&self, job: &ScheduledJobRow, reason: &str, max_attempts: i32) -> ArchonResult<()> {
        let attempts = job.attempts + 1;
        let mut conn = self.conn().await?;

        if attempts >= max_attempts {
            conn.transaction::<_, ArchonError, _>(|conn| {
                async move {
                    diesel::insert_into(dead_letter_jobs::table)
                        .values(NewDeadLetterJob {
                            original_job_id: job.id,
                            job_type: job.job_type.clone(),
                            payload: job.payload.clone(),
                            attempts,
                            failure_reason: reason.to_string(),
                        })
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to dead-letter job: {e}")))?;

                    diesel::update(scheduled_jobs::table.find(job.id))
                        .set((
                            scheduled_jobs::status.eq(JobStatus::Failed.as_str()),
                            scheduled_jobs::attempts.eq(attempts),
                        ))
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to mark job failed: {e}")))?;

                    Ok(())
                }
                .scope_boxed()
            })
            .await?;

            tracing::error!(job_id = job.id, job_type = %job.job_type, attempts, "job moved to dead-letter queue");
            return Err(ArchonError::Unrecoverable {
                attempts,
                reason: reason.to_string(),
            });
        }

        let next_attempt = Utc::now() + backoff_delay(attempts);
        diesel::update(scheduled_jobs::table.find(job.id))
            .set((
                scheduled_jobs::status.eq(JobStatus::Pending.as_str()),
                scheduled_jobs::attempts.eq(attempts),
                scheduled_jobs::scheduled_for.eq(next_attempt),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to reschedule job: {e}")))?;

        tracing::warn!(job_id = job.id, job_type = %job.job_type, attempts, reason, "job failed, rescheduled with backoff");
        Ok(())
    }

    /// Reverts any jobs stuck in `processing` back to `pending` (crash
    /// recovery counterpart to `archon_motions::recover_stranded_promoted`).
    /// A job can only be left `processing` by a worker that died mid-handler;
    /// this is safe to call at process startup.
    pub async fn recover_stranded_processing(&self) -> ArchonResult<i64> {
        let mut conn = self.conn().await?;
        let count = diesel::update(
            scheduled_jobs::table.filter(scheduled_jobs::status.eq(JobStatus::Processing.as_str())),
        )
        .set(scheduled_jobs::status.eq(JobStatus::Pending.as_str()))
        .execute(&mut conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to recover stranded jobs: {e}")))?;
        if count > 0 {
            tracing::warn!(count, "reverted stranded processing jobs to pending");
        }
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_starts_at_base_and_caps() {
        assert_eq!(backoff_delay(0), ChronoDuration::seconds(1));
        assert_eq!(backoff_delay(1), ChronoDuration::seconds(2));
        assert_eq!(backoff_delay(2), ChronoDuration::seconds(4));
        assert_eq!(backoff_delay(10), ChronoDuration::seconds(BACKOFF_CAP_SECS as i64));
    }
}
