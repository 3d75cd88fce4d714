// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The projection engine: runs every registered `Projection` through the
//! idempotent-apply contract (§4.8) and drives full rebuilds from genesis
//! (§8 property 10: replaying a projection from genesis through its
//! checkpointed sequence reproduces the same row content).

use std::sync::Arc;

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;

use archon_ledger::models::StoredEvent;
use archon_ledger::{EventStore, PgPool};
use archon_types::{ArchonError, ArchonResult};

use crate::framework::{advisory_lock, already_applied, mark_applied, truncate_apply_log_and_checkpoint, update_checkpoint, Projection};

const REBUILD_BATCH_SIZE: i64 = 500;

pub struct ProjectionEngine {
    pool: PgPool,
    projections: Vec<Arc<dyn Projection>>,
}

impl ProjectionEngine {
    pub fn new(pool: PgPool) -> Self {
        ProjectionEngine {
            pool,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
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

    /// §4.8 `apply_event(name, event)`, run for every registered
    /// projection. Each projection's slice of work is independently
    /// transactional and idempotent; one projection's failure doesn't roll
    /// back another's.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, sequence = event.sequence))]
    pub async fn apply_event(&self, event: &StoredEvent) -> ArchonResult<()> {
        for projection in &self.projections {
            self.apply_one(projection.as_ref(), event).await?;
        }
        Ok(())
    }

    async fn apply_one(&self, projection: &dyn Projection, event: &StoredEvent) -> ArchonResult<()> {
        let name = projection.name();
        let mut conn = self.conn().await?;
        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                advisory_lock(conn, name).await?;
                if already_applied(conn, name, event.event_id).await? {
                    tracing::debug!(projection = name, "event already applied, skipping");
                    return Ok(());
                }
                projection.apply_domain_update(conn, event).await?;
                mark_applied(conn, name, event.event_id).await?;
                update_checkpoint(conn, name, event.event_id, event.sequence, &event.content_hash).await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    /// §4.8 "Rebuild: truncate the projection's derived tables + apply-log
    /// + checkpoint, replay the ledger from sequence 1." Rebuilds every
    /// registered projection; callers that need a single projection should
    /// register only that one on a scratch engine instance.
    pub async fn rebuild_all(&self, store: &EventStore) -> ArchonResult<()> {
        for projection in &self.projections {
            let mut conn = self.conn().await?;
            let name = projection.name();
            conn.transaction::<_, ArchonError, _>(|conn| {
                async move {
                    advisory_lock(conn, name).await?;
                    projection.truncate(conn).await?;
                    truncate_apply_log_and_checkpoint(conn, name).await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await?;
        }

        let mut start = 1i64;
        loop {
            let batch = store.read_range(start, start + REBUILD_BATCH_SIZE - 1).await?;
            if batch.is_empty() {
                break;
            }
            for event in &batch {
                self.apply_event(event).await?;
            }
            start += REBUILD_BATCH_SIZE;
        }
        tracing::info!("projection rebuild complete");
        Ok(())
    }
}
