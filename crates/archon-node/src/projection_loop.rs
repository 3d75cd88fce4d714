// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The projection-applier worker loop (§4.8): polls the ledger for events
//! past the last sequence it has seen and applies them to every registered
//! projection. Unlike the job queue, the ledger has no "claim" semantics —
//! this loop just tracks its own cursor and re-reads idempotently, which
//! is safe because `ProjectionEngine::apply_event` is itself idempotent
//! per projection (§4.8 "apply-log").

use std::time::Duration;

use archon_ledger::EventStore;
use archon_projections::ProjectionEngine;
use archon_types::error::ArchonResult;

const BATCH_SIZE: i64 = 200;
const IDLE_POLL_BASE: Duration = Duration::from_millis(200);
const IDLE_POLL_CAP: Duration = Duration::from_secs(5);

pub struct ProjectionLoop {
    store: EventStore,
    engine: ProjectionEngine,
}

impl ProjectionLoop {
    pub fn new(store: EventStore, engine: ProjectionEngine) -> Self {
        ProjectionLoop { store, engine }
    }

    /// Runs until `shutdown` fires. A halted system still applies events
    /// that are on the read-safe whitelist — `system.halt.*` events update
    /// the actor-registry projection just like anything else — so unlike
    /// the job worker this loop does not pause wholesale on halt; each
    /// applied event goes through the same idempotent-apply contract
    /// regardless of halt state.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> ArchonResult<()> {
        let mut cursor = 1i64;
        let mut idle_backoff = IDLE_POLL_BASE;

        loop {
            if *shutdown.borrow() {
                tracing::info!("projection loop received shutdown signal");
                return Ok(());
            }

            let batch = self.store.read_range(cursor, cursor + BATCH_SIZE - 1).await?;
            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(idle_backoff) => {}
                    _ = shutdown.changed() => {}
                }
                idle_backoff = (idle_backoff * 2).min(IDLE_POLL_CAP);
                continue;
            }
            idle_backoff = IDLE_POLL_BASE;

            for event in &batch {
                self.engine.apply_event(event).await?;
                cursor = event.sequence + 1;
            }
        }
    }
}
