// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! `legitimacy_states` (§3.10): derived view over `legitimacy.*` events,
//! keyed by `payload.subject_id` (the agent or motion whose legitimacy
//! standing changed).

use async_trait::async_trait;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use archon_ledger::models::StoredEvent;
use archon_types::{ArchonError, ArchonResult};

use crate::framework::Projection;
use crate::schema::legitimacy_states;

pub struct LegitimacyStatesProjection;

impl LegitimacyStatesProjection {
    pub const NAME: &'static str = "legitimacy_states";
}

#[async_trait]
impl Projection for LegitimacyStatesProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply_domain_update(&self, conn: &mut AsyncPgConnection, event: &StoredEvent) -> ArchonResult<()> {
        if event.branch != "legitimacy" {
            return Ok(());
        }
        let Some(subject_id) = event.payload.get("subject_id").and_then(|v| v.as_str()) else {
            tracing::warn!(event_id = %event.event_id, "legitimacy.* event missing subject_id, skipping");
            return Ok(());
        };

        diesel::insert_into(legitimacy_states::table)
            .values((
                legitimacy_states::subject_id.eq(subject_id),
                legitimacy_states::state.eq(event.payload.clone()),
                legitimacy_states::last_event_sequence.eq(event.sequence),
                legitimacy_states::last_event_hash.eq(&event.content_hash),
            ))
            .on_conflict(legitimacy_states::subject_id)
            .do_update()
            .set((
                legitimacy_states::state.eq(event.payload.clone()),
                legitimacy_states::last_event_sequence.eq(event.sequence),
                legitimacy_states::last_event_hash.eq(&event.content_hash),
            ))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to upsert legitimacy_states: {e}")))?;
        Ok(())
    }

    async fn truncate(&self, conn: &mut AsyncPgConnection) -> ArchonResult<()> {
        diesel::delete(legitimacy_states::table)
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to truncate legitimacy_states: {e}")))?;
        Ok(())
    }
}
