// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! `actor_registry` (§3.10): last-activity registry, keyed by
//! `event.agent_id`. Unlike the other four derived tables this one isn't
//! scoped to a single branch — every committed event carries an agent_id,
//! and a registry of "what did each actor last do" is only useful if it
//! reflects activity across all branches rather than one. That reading is
//! an Open Question resolution, recorded in DESIGN.md.

use async_trait::async_trait;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::json;

use archon_ledger::models::StoredEvent;
use archon_types::{ArchonError, ArchonResult};

use crate::framework::Projection;
use crate::schema::actor_registry;

pub struct ActorRegistryProjection;

impl ActorRegistryProjection {
    pub const NAME: &'static str = "actor_registry";
}

#[async_trait]
impl Projection for ActorRegistryProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply_domain_update(&self, conn: &mut AsyncPgConnection, event: &StoredEvent) -> ArchonResult<()> {
        let state = json!({
            "agent_id": event.agent_id,
            "last_branch": event.branch,
            "last_event_type": event.event_type,
            "last_event_at": event.authority_timestamp,
        });

        diesel::insert_into(actor_registry::table)
            .values((
                actor_registry::agent_id.eq(&event.agent_id),
                actor_registry::state.eq(state.clone()),
                actor_registry::last_event_sequence.eq(event.sequence),
                actor_registry::last_event_hash.eq(&event.content_hash),
            ))
            .on_conflict(actor_registry::agent_id)
            .do_update()
            .set((
                actor_registry::state.eq(state),
                actor_registry::last_event_sequence.eq(event.sequence),
                actor_registry::last_event_hash.eq(&event.content_hash),
            ))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to upsert actor_registry: {e}")))?;
        Ok(())
    }

    async fn truncate(&self, conn: &mut AsyncPgConnection) -> ArchonResult<()> {
        diesel::delete(actor_registry::table)
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to truncate actor_registry: {e}")))?;
        Ok(())
    }
}
