// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The `escalation_check` job handler (§4.7): a backstop recheck of a
//! petition's co-signer count against its threshold, for the case where the
//! inline auto-escalate in [`crate::cosign::CoSignService::cosign`] was
//! bypassed (e.g. a `co_signer_count` adjustment outside that path).
//! Idempotent — a petition already past `deliberating` is left untouched.

use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use archon_config::ArchonConfig;
use archon_jobs::{JobHandler, ScheduledJobRow, JOB_TYPE_ESCALATION_CHECK};
use archon_ledger::PgPool;
use archon_types::{ArchonError, ArchonResult};

use crate::cosign::parse_petition_type;
use crate::models::{PetitionRow, PetitionState, ESCALATION_SOURCE_CO_SIGNER_THRESHOLD};
use crate::schema::petitions;

pub struct EscalationCheckHandler {
    pool: PgPool,
    config: ArchonConfig,
}

impl EscalationCheckHandler {
    pub fn new(pool: PgPool, config: ArchonConfig) -> Self {
        EscalationCheckHandler { pool, config }
    }
}

#[async_trait::async_trait]
impl JobHandler for EscalationCheckHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_ESCALATION_CHECK
    }

    #[tracing::instrument(skip(self, job))]
    async fn handle(&self, job: &ScheduledJobRow) -> ArchonResult<()> {
        let petition_id: Uuid = job
            .payload
            .get("petition_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ArchonError::SchemaInvalid("escalation_check job missing petition_id".to_string()))?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to acquire connection: {e}")))?;

        let threshold_map = &self.config;
        let escalated = conn
            .transaction::<_, ArchonError, _>(|conn| {
                async move {
                    let petition: PetitionRow = petitions::table
                        .find(petition_id)
                        .first(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to load petition for escalation check: {e}")))?;

                    if petition.state != PetitionState::Received.as_str() && petition.state != PetitionState::Deliberating.as_str() {
                        return Ok(false);
                    }

                    let petition_type = parse_petition_type(&petition.petition_type)?;
                    let threshold = threshold_map.escalation_threshold(petition_type.as_config_type()) as i32;
                    if petition.co_signer_count < threshold {
                        return Ok(false);
                    }

                    let rows = diesel::update(
                        petitions::table.find(petition_id).filter(petitions::state.ne(PetitionState::Escalated.as_str())),
                    )
                    .set((
                        petitions::state.eq(PetitionState::Escalated.as_str()),
                        petitions::escalation_source.eq(Some(ESCALATION_SOURCE_CO_SIGNER_THRESHOLD.to_string())),
                    ))
                    .execute(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to escalate petition {petition_id} on recheck: {e}")))?;
                    Ok(rows > 0)
                }
                .scope_boxed()
            })
            .await?;

        if escalated {
            tracing::warn!(%petition_id, "escalation check recheck escalated a petition the inline co-sign path missed");
        }
        Ok(())
    }
}
