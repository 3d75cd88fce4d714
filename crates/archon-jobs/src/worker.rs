// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The job-poller worker loop (§4.7, §5 "Scheduling model"). One of the
//! small number of long-lived loops the process runs; cooperates with the
//! other loops purely through the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use archon_halt::HaltAuthority;
use archon_types::ArchonResult;

use crate::handler::JobHandler;
use crate::queue::JobQueue;

/// Idle-poll backoff bounds, distinct from the per-job retry backoff in
/// `queue.rs`: when the queue is empty the worker backs off up to a cap
/// rather than hammering the database every tick (§5 "job-queue polling
/// uses bounded blocking with exponential backoff").
const IDLE_POLL_BASE: Duration = Duration::from_millis(200);
const IDLE_POLL_CAP: Duration = Duration::from_secs(5);

pub struct JobWorker {
    queue: Arc<JobQueue>,
    halt: Arc<HaltAuthority>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    batch_size: i64,
    max_attempts: i32,
}

impl JobWorker {
    pub fn new(queue: Arc<JobQueue>, halt: Arc<HaltAuthority>, batch_size: i64, max_attempts: i32) -> Self {
        JobWorker {
            queue,
            halt,
            handlers: HashMap::new(),
            batch_size,
            max_attempts,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type(), handler);
    }

    /// Runs until `shutdown` fires. Each iteration: halt check, claim a
    /// batch, dispatch each to its registered handler, idle-backoff if the
    /// batch was empty. A halted system pauses entirely without mutating
    /// any job row (§4.4 "Job queue: a halted system pauses execution but
    /// does not mutate job rows").
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> ArchonResult<()> {
        let mut idle_backoff = IDLE_POLL_BASE;
        loop {
            if *shutdown.borrow() {
                tracing::info!("job worker received shutdown signal");
                return Ok(());
            }

            let status = self.halt.status().await?;
            if status.is_halted {
                tracing::debug!("job worker idle: system halted");
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL_CAP) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            let batch = self.queue.claim_batch(self.batch_size).await?;
            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(idle_backoff) => {}
                    _ = shutdown.changed() => {}
                }
                idle_backoff = (idle_backoff * 2).min(IDLE_POLL_CAP);
                continue;
            }
            idle_backoff = IDLE_POLL_BASE;

            for job in batch {
                let span = tracing::info_span!("job", job_id = job.id, job_type = %job.job_type);
                let _enter = span.enter();
                match self.handlers.get(job.job_type.as_str()) {
                    Some(handler) => match handler.handle(&job).await {
                        Ok(()) => {
                            if let Err(e) = self.queue.complete(job.id).await {
                                tracing::error!(error = %e, "failed to mark job completed");
                            }
                        }
                        Err(e) => {
                            if let Err(fail_err) = self.queue.fail(&job, &e.to_string(), self.max_attempts).await {
                                tracing::debug!(error = %fail_err, "fail() returned Unrecoverable as expected on DLQ transition");
                            }
                        }
                    },
                    None => {
                        tracing::error!("no handler registered for job_type");
                        let _ = self
                            .queue
                            .fail(&job, "no registered handler", self.max_attempts)
                            .await;
                    }
                }
            }
        }
    }
}
