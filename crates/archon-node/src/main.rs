// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Archon 72 worker process. Boots configuration and logging, runs
//! migrations, and drives the long-lived loops named in SPEC_FULL.md §0:
//! the job poller, the projection applier, and the Conclave/Three-Fates
//! orchestrators that those loops dispatch into. No HTTP surface, no CLI
//! flags — every setting comes from the environment (§6), matching the
//! Non-goal that excludes a CLI-option-parsing surface.

mod conclave_loop;
mod deliberation_loop;
mod operator;
mod projection_loop;

use std::sync::Arc;

use anyhow::Context;

use archon_conclave::{AdjournReconciliationHandler, ConclaveOrchestrator};
use archon_fates::{DeliberationTimeoutHandler, ReferralTimeoutHandler, ThreeFates};
use archon_halt::HaltAuthority;
use archon_jobs::{JobQueue, JobWorker};
use archon_ledger::{connect, run_migrations, EventStore, PgKeyRegistry};
use archon_logger::LogFormat;
use archon_motions::{EscalationCheckHandler, MotionQueue, MotionStore, PetitionIntake};
use archon_projections::ProjectionEngine;
use archon_types::agent_invoker::{AgentInvoker, MockAgentInvoker, RetryingInvoker};

use conclave_loop::ConclaveLoop;
use deliberation_loop::DeliberationLoop;
use operator::SystemOperator;
use projection_loop::ProjectionLoop;

/// Concurrent sessions a single adjudicator may serve before being
/// excluded from a new Three-Fates draw (§4.6 "adjudicator selection").
const MAX_CONCURRENT_DELIBERATION_SESSIONS: i64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_format = if std::env::var("ARCHON_LOG_FORMAT").as_deref() == Ok("json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    archon_logger::init(log_format);

    if let Err(e) = run().await {
        tracing::error!(error = %e, "archon-node exited with an error");
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = archon_config::ArchonConfig::from_env().context("loading configuration")?;

    run_migrations(&config.database_url).await.context("running ledger migrations")?;
    let pool = connect(&config.database_url).await.context("connecting to Postgres")?;

    let key_registry = PgKeyRegistry::new(pool.clone());
    let operator = Arc::new(
        SystemOperator::bootstrap(&key_registry)
            .await
            .context("bootstrapping system signing identity")?,
    );

    let halt = Arc::new(HaltAuthority::new(pool.clone(), EventStore::new(pool.clone(), config.clock_drift_threshold)));

    // `archon-node` provides the real `AgentInvoker` implementation at this
    // seam. No LLM client is implemented here (Non-goal, §1); the mock
    // invoker stands in as the deterministic placeholder a real provider
    // integration would replace. `RetryingInvoker` adds the per-call
    // timeout and bounded-retry-with-backoff wrapper §5 requires, so every
    // caller sees the same fail-after-retries behavior a real provider
    // client would need.
    let invoker: Arc<dyn AgentInvoker> = Arc::new(RetryingInvoker::new(
        MockAgentInvoker::new("ABSTAIN"),
        config.agent_invocation_timeout,
        config.agent_invocation_max_retries,
    ));

    let job_queue = Arc::new(JobQueue::new(pool.clone()));
    let motion_queue = MotionQueue::new(pool.clone());
    let motion_store = MotionStore::new(pool.clone());
    let petition_intake = PetitionIntake::new(pool.clone(), EventStore::new(pool.clone(), config.clock_drift_threshold), config.clone());

    let fates = ThreeFates::new(
        pool.clone(),
        EventStore::new(pool.clone(), config.clock_drift_threshold),
        invoker.clone(),
        (*job_queue).clone(),
        MAX_CONCURRENT_DELIBERATION_SESSIONS,
        config.deliberation_timeout.as_secs() as i64,
        config.referral_deadline_cycles,
        config.referral_deadline_max_extensions,
    );

    let conclave = ConclaveOrchestrator::new(
        pool.clone(),
        EventStore::new(pool.clone(), config.clock_drift_threshold),
        halt.clone(),
        invoker.clone(),
        (*job_queue).clone(),
        MotionQueue::new(pool.clone()),
        MotionStore::new(pool.clone()),
        config.clone(),
    );

    let mut projection_engine = ProjectionEngine::new(pool.clone());
    archon_projections::register_all(&mut projection_engine);
    let projection_loop = ProjectionLoop::new(EventStore::new(pool.clone(), config.clock_drift_threshold), projection_engine);

    let mut job_worker = JobWorker::new(job_queue.clone(), halt.clone(), config.poll_batch_size as i64, config.job_max_attempts);
    job_worker.register(Arc::new(DeliberationTimeoutHandler::new(
        pool.clone(),
        EventStore::new(pool.clone(), config.clock_drift_threshold),
    )));
    job_worker.register(Arc::new(ReferralTimeoutHandler::new(
        pool.clone(),
        (*job_queue).clone(),
        config.deliberation_timeout.as_secs() as i64 * config.referral_deadline_cycles.max(1) as i64,
        config.referral_deadline_max_extensions,
    )));
    job_worker.register(Arc::new(EscalationCheckHandler::new(pool.clone(), config.clone())));
    job_worker.register(Arc::new(AdjournReconciliationHandler::new(pool.clone())));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // `ConclaveOrchestrator` and `ThreeFates` are driven by the
    // sessions/motions/petitions they're handed, not a standing poll loop
    // of their own (§3.6, §4.6); the cadence loops below are the callers
    // that claim queued work and invoke them.
    let deliberation_loop = DeliberationLoop::new(fates, petition_intake, job_queue.clone(), halt.clone(), operator.clone());
    let conclave_loop = ConclaveLoop::new(conclave, motion_queue, motion_store, operator.clone());

    let job_worker_handle = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { job_worker.run(shutdown_rx).await })
    };
    let projection_handle = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { projection_loop.run(shutdown_rx).await })
    };
    let deliberation_handle = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { deliberation_loop.run(shutdown_rx).await })
    };
    let conclave_handle = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { conclave_loop.run(shutdown_rx).await })
    };

    tracing::info!(
        signing_key_id = operator.context().signing_key_id,
        "archon-node worker loops started"
    );

    tokio::select! {
        result = job_worker_handle => {
            result.context("job worker task panicked")?.context("job worker loop failed")?;
        }
        result = projection_handle => {
            result.context("projection loop task panicked")?.context("projection loop failed")?;
        }
        result = deliberation_handle => {
            result.context("deliberation loop task panicked")?.context("deliberation loop failed")?;
        }
        result = conclave_handle => {
            result.context("conclave loop task panicked")?.context("conclave loop failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, stopping worker loops");
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}
