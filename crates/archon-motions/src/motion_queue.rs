// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The persistent, priority-ordered motion queue (§3.5, §4.9). Selection
//! and promotion are transactional so two Conclave orchestrator instances
//! can never claim the same entry (§5 "Motion-queue promotion is
//! transactional").

use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use archon_ledger::PgPool;
use archon_types::{ArchonError, ArchonResult};

use crate::models::{ConsensusTier, MotionQueueEntryRow, NewMotionQueueEntry, QueueEntryStatus};
use crate::schema::motion_queue_entries;

pub struct MotionQueue {
    pool: PgPool,
}

impl MotionQueue {
    pub fn new(pool: PgPool) -> Self {
        MotionQueue { pool }
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

    /// Enqueues a freshly created motion (§4.9).
    pub async fn enqueue(&self, motion_id: Uuid, consensus_tier: ConsensusTier) -> ArchonResult<Uuid> {
        let entry_id = Uuid::new_v4();
        let mut conn = self.conn().await?;
        diesel::insert_into(motion_queue_entries::table)
            .values(NewMotionQueueEntry {
                entry_id,
                motion_id,
                consensus_tier: consensus_tier.as_str().to_string(),
                endorsement_count: 0,
                status: QueueEntryStatus::Pending.as_str().to_string(),
            })
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to enqueue motion: {e}")))?;
        Ok(entry_id)
    }

    /// §4.9 `select_for_conclave(max_items, min_consensus)`: filters by
    /// status and minimum consensus tier, orders by `(endorsement_count
    /// desc, created_at asc)`, and promotes the winners to `promoted` in
    /// the same transaction that selected them.
    #[tracing::instrument(skip(self))]
    pub async fn select_for_conclave(
        &self,
        max_items: i64,
        min_consensus: ConsensusTier,
    ) -> ArchonResult<Vec<MotionQueueEntryRow>> {
        let eligible_tiers: Vec<&'static str> = [
            ConsensusTier::Critical,
            ConsensusTier::High,
            ConsensusTier::Medium,
            ConsensusTier::Low,
            ConsensusTier::Single,
        ]
        .into_iter()
        .filter(|tier| *tier >= min_consensus)
        .map(|tier| tier.as_str())
        .collect();

        let mut conn = self.conn().await?;
        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                let selected: Vec<MotionQueueEntryRow> = motion_queue_entries::table
                    .filter(
                        motion_queue_entries::status
                            .eq(QueueEntryStatus::Pending.as_str())
                            .or(motion_queue_entries::status.eq(QueueEntryStatus::Endorsed.as_str())),
                    )
                    .filter(motion_queue_entries::consensus_tier.eq_any(eligible_tiers))
                    .order((
                        motion_queue_entries::endorsement_count.desc(),
                        motion_queue_entries::created_at.asc(),
                    ))
                    .limit(max_items)
                    .for_update()
                    .skip_locked()
                    .load(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to select queue entries: {e}")))?;

                for entry in &selected {
                    diesel::update(motion_queue_entries::table.find(entry.entry_id))
                        .set(motion_queue_entries::status.eq(QueueEntryStatus::Promoted.as_str()))
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to promote queue entry: {e}")))?;
                }

                Ok(selected)
            }
            .scope_boxed()
        })
        .await
    }

    /// Attaches the Conclave session id that a promoted entry was drawn
    /// into (§3.6's cyclic-ownership resolution: the queue entry holds the
    /// session id, the session holds motion ids — neither owns the other).
    pub async fn assign_session(&self, entry_id: Uuid, session_id: Uuid) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(motion_queue_entries::table.find(entry_id))
            .set(motion_queue_entries::session_id.eq(Some(session_id)))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to attach session to queue entry: {e}")))?;
        Ok(())
    }

    /// §4.9 `recover_stranded_promoted()`, run at orchestrator startup.
    /// Reverts `promoted` entries that were never attached to a session
    /// (the orchestrator died between promotion and session creation).
    /// Entries attached to a session whose process also died are recovered
    /// separately via `revert_promoted_for_dead_sessions`, once the caller
    /// knows which session ids are still live.
    #[tracing::instrument(skip(self))]
    pub async fn recover_stranded_promoted(&self) -> ArchonResult<i64> {
        let mut conn = self.conn().await?;
        let count = diesel::update(
            motion_queue_entries::table
                .filter(motion_queue_entries::status.eq(QueueEntryStatus::Promoted.as_str()))
                .filter(motion_queue_entries::session_id.is_null()),
        )
        .set(motion_queue_entries::status.eq(QueueEntryStatus::Pending.as_str()))
        .execute(&mut conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to recover stranded queue entries: {e}")))?;
        if count > 0 {
            tracing::warn!(count, "reverted stranded promoted queue entries to pending");
        }
        Ok(count as i64)
    }

    /// Reverts `promoted` entries attached to a session id that is not in
    /// `live_session_ids` back to `pending`.
    pub async fn revert_promoted_for_dead_sessions(&self, live_session_ids: &[Uuid]) -> ArchonResult<i64> {
        let mut conn = self.conn().await?;
        let stranded: Vec<MotionQueueEntryRow> = motion_queue_entries::table
            .filter(motion_queue_entries::status.eq(QueueEntryStatus::Promoted.as_str()))
            .filter(motion_queue_entries::session_id.is_not_null())
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load promoted queue entries: {e}")))?;

        let mut reverted = 0i64;
        for entry in stranded {
            let Some(session_id) = entry.session_id else { continue };
            if live_session_ids.contains(&session_id) {
                continue;
            }
            diesel::update(motion_queue_entries::table.find(entry.entry_id))
                .set((
                    motion_queue_entries::status.eq(QueueEntryStatus::Pending.as_str()),
                    motion_queue_entries::session_id.eq(Option::<Uuid>::None),
                ))
                .execute(&mut conn)
                .await
                .map_err(|e| ArchonError::Storage(format!("failed to revert dead-session queue entry: {e}")))?;
            reverted += 1;
        }
        if reverted > 0 {
            tracing::warn!(reverted, "reverted promoted queue entries with dead sessions to pending");
        }
        Ok(reverted)
    }

    /// Archival on vote (§4.9): the queue entry's terminal record is the
    /// `archived` status itself plus the motion's own ledger events — there
    /// is no separate archive table in this schema (see DESIGN.md).
    pub async fn archive(&self, entry_id: Uuid) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(motion_queue_entries::table.find(entry_id))
            .set(motion_queue_entries::status.eq(QueueEntryStatus::Archived.as_str()))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to archive queue entry: {e}")))?;
        Ok(())
    }
}
