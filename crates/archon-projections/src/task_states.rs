// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! `task_states` (§3.10): derived view over `executive.task.*` events,
//! keyed by `payload.task_id`. The producers of these events (the
//! Executive Planner pipeline) are out of scope (§1); this projection
//! only needs to agree on the `task_id` field's presence.

use async_trait::async_trait;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use archon_ledger::models::StoredEvent;
use archon_types::{ArchonError, ArchonResult};

use crate::framework::Projection;
use crate::schema::task_states;

pub struct TaskStatesProjection;

impl TaskStatesProjection {
    pub const NAME: &'static str = "task_states";
}

#[async_trait]
impl Projection for TaskStatesProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply_domain_update(&self, conn: &mut AsyncPgConnection, event: &StoredEvent) -> ArchonResult<()> {
        if event.branch != "executive" || !event.event_type.starts_with("executive.task.") {
            return Ok(());
        }
        let Some(task_id) = event.payload.get("task_id").and_then(|v| v.as_str()) else {
            tracing::warn!(event_id = %event.event_id, "executive.task.* event missing task_id, skipping");
            return Ok(());
        };

        diesel::insert_into(task_states::table)
            .values((
                task_states::task_id.eq(task_id),
                task_states::state.eq(event.payload.clone()),
                task_states::last_event_sequence.eq(event.sequence),
                task_states::last_event_hash.eq(&event.content_hash),
            ))
            .on_conflict(task_states::task_id)
            .do_update()
            .set((
                task_states::state.eq(event.payload.clone()),
                task_states::last_event_sequence.eq(event.sequence),
                task_states::last_event_hash.eq(&event.content_hash),
            ))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to upsert task_states: {e}")))?;
        Ok(())
    }

    async fn truncate(&self, conn: &mut AsyncPgConnection) -> ArchonResult<()> {
        diesel::delete(task_states::table)
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to truncate task_states: {e}")))?;
        Ok(())
    }
}
