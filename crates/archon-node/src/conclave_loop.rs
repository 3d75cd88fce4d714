// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Parliamentary Conclave cadence loop: periodically drains the motion
//! queue into a full-roster session (§3.6, §4.5). Unlike Three-Fates, which
//! opens one session per petition, a single Conclave session processes a
//! whole queue-selection batch before adjourning — matching §4.5's "one
//! sitting resolves new business to exhaustion, then adjourns" framing.
//!
//! Seconding: no separate endorsement intake exists for motions, so a
//! promoted entry whose motion has no `seconder_id` yet is auto-seconded by
//! the first present Archon (in rank-priority order) who is not the
//! proposer. This is a recorded default, not an endorsement vote (see
//! DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use archon_conclave::ConclaveOrchestrator;
use archon_motions::{ConsensusTier, MotionQueue, MotionStore};
use archon_types::error::ArchonResult;
use archon_types::roster::rank_priority_order;

use crate::operator::SystemOperator;

const QUEUE_BATCH_SIZE: i64 = 50;
const CADENCE_INTERVAL: Duration = Duration::from_secs(30);

pub struct ConclaveLoop {
    orchestrator: ConclaveOrchestrator,
    motion_queue: MotionQueue,
    motion_store: MotionStore,
    operator: Arc<SystemOperator>,
}

impl ConclaveLoop {
    pub fn new(orchestrator: ConclaveOrchestrator, motion_queue: MotionQueue, motion_store: MotionStore, operator: Arc<SystemOperator>) -> Self {
        ConclaveLoop { orchestrator, motion_queue, motion_store, operator }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> ArchonResult<()> {
        loop {
            if *shutdown.borrow() {
                tracing::info!("conclave loop received shutdown signal");
                return Ok(());
            }

            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "conclave cadence tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(CADENCE_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn tick(&self) -> ArchonResult<()> {
        let entries = self.motion_queue.select_for_conclave(QUEUE_BATCH_SIZE, ConsensusTier::Single).await?;
        if entries.is_empty() {
            return Ok(());
        }

        let signer = self.operator.context();
        let present_archons: Vec<String> = rank_priority_order().iter().map(|p| p.id.get().to_string()).collect();

        let session_id = self.orchestrator.open_session(&present_archons, &signer).await?;
        for entry in &entries {
            self.motion_queue.assign_session(entry.entry_id, session_id).await?;
        }

        let mut seconders: HashMap<uuid::Uuid, String> = HashMap::new();
        for entry in &entries {
            let motion = self.motion_store.get(entry.motion_id).await?;
            if let Some(seconder_id) = motion.seconder_id {
                seconders.insert(entry.motion_id, seconder_id);
                continue;
            }
            if let Some(seconder) = present_archons.iter().find(|id| **id != motion.proposer_id) {
                seconders.insert(entry.motion_id, seconder.clone());
            }
        }

        self.orchestrator.run_new_business(session_id, entries, &seconders, &signer).await
    }
}
