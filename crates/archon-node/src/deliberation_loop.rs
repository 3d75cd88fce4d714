// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Three-Fates cadence loop: pulls `received` petitions into
//! deliberation and drives every still-open session forward (§4.6).
//! `run_session`'s own optimistic-concurrency check on `version` is what
//! keeps a cadence tick from double-advancing a session the
//! `deliberation_timeout` job handler is also touching.

use std::sync::Arc;
use std::time::Duration;

use archon_fates::ThreeFates;
use archon_halt::HaltAuthority;
use archon_jobs::JobQueue;
use archon_motions::PetitionIntake;
use archon_types::error::ArchonResult;

use crate::operator::SystemOperator;

const PETITION_BATCH_SIZE: i64 = 20;
const CADENCE_INTERVAL: Duration = Duration::from_secs(5);

pub struct DeliberationLoop {
    fates: ThreeFates,
    intake: PetitionIntake,
    jobs: Arc<JobQueue>,
    halt: Arc<HaltAuthority>,
    operator: Arc<SystemOperator>,
}

impl DeliberationLoop {
    pub fn new(fates: ThreeFates, intake: PetitionIntake, jobs: Arc<JobQueue>, halt: Arc<HaltAuthority>, operator: Arc<SystemOperator>) -> Self {
        DeliberationLoop { fates, intake, jobs, halt, operator }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> ArchonResult<()> {
        loop {
            if *shutdown.borrow() {
                tracing::info!("deliberation loop received shutdown signal");
                return Ok(());
            }

            let status = self.halt.status().await?;
            if !status.is_halted {
                if let Err(e) = self.tick().await {
                    tracing::warn!(error = %e, "deliberation cadence tick failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(CADENCE_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn tick(&self) -> ArchonResult<()> {
        let signer = self.operator.context();

        let newly_ready = self.intake.select_for_deliberation(PETITION_BATCH_SIZE).await?;
        for petition in &newly_ready {
            match self
                .fates
                .open_session(petition.petition_id, &petition.content_hash, &self.jobs, &signer)
                .await
            {
                Ok(session_id) => {
                    tracing::info!(petition_id = %petition.petition_id, session_id = %session_id, "opened deliberation session");
                }
                Err(e) => {
                    tracing::warn!(petition_id = %petition.petition_id, error = %e, "failed to open deliberation session");
                }
            }
        }

        for session in self.fates.open_sessions().await? {
            let body = match self.intake.body_of(session.petition_id).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(session_id = %session.session_id, error = %e, "failed to load petition body for open session");
                    continue;
                }
            };
            if let Err(e) = self.fates.run_session(session.session_id, &body, &signer).await {
                tracing::warn!(session_id = %session.session_id, error = %e, "deliberation session did not advance this tick");
            }
        }

        Ok(())
    }
}
