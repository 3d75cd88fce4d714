// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! `petition_index` (§3.10): derived view over `petition.*` events, keyed
//! by `payload.petition_id`. Used by the intake pipeline and co-signing
//! gates (§4.9) to answer "what is this petition's current state"
//! without replaying the ledger.

use async_trait::async_trait;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use archon_ledger::models::StoredEvent;
use archon_types::{ArchonError, ArchonResult};

use crate::framework::Projection;
use crate::schema::petition_index;

pub struct PetitionIndexProjection;

impl PetitionIndexProjection {
    pub const NAME: &'static str = "petition_index";
}

#[async_trait]
impl Projection for PetitionIndexProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply_domain_update(&self, conn: &mut AsyncPgConnection, event: &StoredEvent) -> ArchonResult<()> {
        // judicial.deliberation.completed carries the petition's terminal
        // disposition but is branded under the judicial branch, not
        // petition, since it's the Three-Fates session's own audit record.
        if event.branch != "petition" && event.event_type != "judicial.deliberation.completed" {
            return Ok(());
        }
        let Some(petition_id) = event
            .payload
            .get("petition_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            tracing::warn!(event_id = %event.event_id, "petition.* event missing valid petition_id, skipping");
            return Ok(());
        };

        diesel::insert_into(petition_index::table)
            .values((
                petition_index::petition_id.eq(petition_id),
                petition_index::state.eq(event.payload.clone()),
                petition_index::last_event_sequence.eq(event.sequence),
                petition_index::last_event_hash.eq(&event.content_hash),
            ))
            .on_conflict(petition_index::petition_id)
            .do_update()
            .set((
                petition_index::state.eq(event.payload.clone()),
                petition_index::last_event_sequence.eq(event.sequence),
                petition_index::last_event_hash.eq(&event.content_hash),
            ))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to upsert petition_index: {e}")))?;
        Ok(())
    }

    async fn truncate(&self, conn: &mut AsyncPgConnection) -> ArchonResult<()> {
        diesel::delete(petition_index::table)
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to truncate petition_index: {e}")))?;
        Ok(())
    }
}
