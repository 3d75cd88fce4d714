// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The `Motion` aggregate (§3.5). Owned here so both the adoption bridge
//! (which creates motions out of escalated petitions) and the Conclave
//! orchestrator (which drives a motion's status through its debate/vote
//! lifecycle) share one write path.

use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use archon_ledger::PgPool;
use archon_types::{ArchonError, ArchonResult};

use crate::models::{MotionRow, MotionStatus, MotionType, NewMotion};
use crate::schema::motions;

pub struct MotionStore {
    pool: PgPool,
}

impl MotionStore {
    pub fn new(pool: PgPool) -> Self {
        MotionStore { pool }
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

    /// §4.5 step 1 "Proposal": records the motion and its proposer. A
    /// bridge-injected (externally proposed) motion is recorded exactly
    /// the same way — the caller, not this method, decides whether
    /// proposer-rank checks apply.
    pub async fn propose(&self, motion_id: Uuid, title: &str, body: &str, motion_type: MotionType, proposer_id: &str) -> ArchonResult<MotionRow> {
        if body.chars().count() > 10_000 {
            return Err(ArchonError::SchemaInvalid("motion body exceeds 10,000 characters".to_string()));
        }
        let mut conn = self.conn().await?;
        diesel::insert_into(motions::table)
            .values(NewMotion {
                motion_id,
                title: title.to_string(),
                body: body.to_string(),
                motion_type: motion_type.as_str().to_string(),
                proposer_id: proposer_id.to_string(),
                seconder_id: None,
                status: MotionStatus::Proposed.as_str().to_string(),
            })
            .get_result(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to propose motion: {e}")))
    }

    pub async fn get(&self, motion_id: Uuid) -> ArchonResult<MotionRow> {
        let mut conn = self.conn().await?;
        motions::table
            .find(motion_id)
            .first(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load motion: {e}")))
    }

    /// §4.5 step 2 "Seconding".
    pub async fn second(&self, motion_id: Uuid, seconder_id: &str) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(motions::table.find(motion_id))
            .set((
                motions::seconder_id.eq(Some(seconder_id.to_string())),
                motions::status.eq(MotionStatus::Seconded.as_str()),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to second motion: {e}")))?;
        Ok(())
    }

    pub async fn set_status(&self, motion_id: Uuid, status: MotionStatus) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(motions::table.find(motion_id))
            .set(motions::status.eq(status.as_str()))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to update motion status: {e}")))?;
        Ok(())
    }
}
