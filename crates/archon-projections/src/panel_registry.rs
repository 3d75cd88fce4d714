// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! `panel_registry` (§3.10): derived view over `judicial.panel.*` events
//! emitted by the Three-Fates adjudicator-assignment step, keyed by
//! `payload.panel_id` (the deliberation session id).

use async_trait::async_trait;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use archon_ledger::models::StoredEvent;
use archon_types::{ArchonError, ArchonResult};

use crate::framework::Projection;
use crate::schema::panel_registry;

pub struct PanelRegistryProjection;

impl PanelRegistryProjection {
    pub const NAME: &'static str = "panel_registry";
}

#[async_trait]
impl Projection for PanelRegistryProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply_domain_update(&self, conn: &mut AsyncPgConnection, event: &StoredEvent) -> ArchonResult<()> {
        if event.branch != "judicial" || !event.event_type.starts_with("judicial.panel.") {
            return Ok(());
        }
        let Some(panel_id) = event.payload.get("panel_id").and_then(|v| v.as_str()) else {
            tracing::warn!(event_id = %event.event_id, "judicial.panel.* event missing panel_id, skipping");
            return Ok(());
        };

        diesel::insert_into(panel_registry::table)
            .values((
                panel_registry::panel_id.eq(panel_id),
                panel_registry::state.eq(event.payload.clone()),
                panel_registry::last_event_sequence.eq(event.sequence),
                panel_registry::last_event_hash.eq(&event.content_hash),
            ))
            .on_conflict(panel_registry::panel_id)
            .do_update()
            .set((
                panel_registry::state.eq(event.payload.clone()),
                panel_registry::last_event_sequence.eq(event.sequence),
                panel_registry::last_event_hash.eq(&event.content_hash),
            ))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to upsert panel_registry: {e}")))?;
        Ok(())
    }

    async fn truncate(&self, conn: &mut AsyncPgConnection) -> ArchonResult<()> {
        diesel::delete(panel_registry::table)
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to truncate panel_registry: {e}")))?;
        Ok(())
    }
}
