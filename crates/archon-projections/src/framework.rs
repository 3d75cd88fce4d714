// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The projection-apply contract (§4.8): idempotent apply, checkpointing,
//! and rebuild. Dispatch by `event_type` lives in `registry.rs` (§9
//! "reflection -> a table of handlers keyed by event_type").

use async_trait::async_trait;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use archon_ledger::models::StoredEvent;
use archon_types::{ArchonError, ArchonResult};

use crate::schema::{projection_applies, projection_checkpoints};

/// One named, independently rebuildable read model (§3.10, §4.8). Each
/// implementation owns a slice of the `projections` schema and may only
/// write there — never back into the ledger.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies the domain-specific update for `event` to this projection's
    /// own tables. Called only after the idempotency log has confirmed
    /// this is the first time `event.event_id` has reached this
    /// projection. A no-op for event types this projection doesn't care
    /// about is expected and not an error.
    async fn apply_domain_update(&self, conn: &mut AsyncPgConnection, event: &StoredEvent) -> ArchonResult<()>;

    /// Truncates this projection's own derived table(s). The engine
    /// truncates the shared apply-log and checkpoint row separately.
    async fn truncate(&self, conn: &mut AsyncPgConnection) -> ArchonResult<()>;
}

pub(crate) async fn already_applied(
    conn: &mut AsyncPgConnection,
    name: &str,
    event_id: uuid::Uuid,
) -> ArchonResult<bool> {
    let found: Option<uuid::Uuid> = projection_applies::table
        .select(projection_applies::event_id)
        .filter(projection_applies::projection_name.eq(name))
        .filter(projection_applies::event_id.eq(event_id))
        .first(conn)
        .await
        .optional()
        .map_err(|e| ArchonError::Storage(format!("failed to read apply log: {e}")))?;
    Ok(found.is_some())
}

pub(crate) async fn mark_applied(conn: &mut AsyncPgConnection, name: &str, event_id: uuid::Uuid) -> ArchonResult<()> {
    diesel::insert_into(projection_applies::table)
        .values((
            projection_applies::projection_name.eq(name),
            projection_applies::event_id.eq(event_id),
        ))
        .execute(conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to record apply log entry: {e}")))?;
    Ok(())
}

pub(crate) async fn update_checkpoint(
    conn: &mut AsyncPgConnection,
    name: &str,
    event_id: uuid::Uuid,
    sequence: i64,
    hash: &str,
) -> ArchonResult<()> {
    diesel::insert_into(projection_checkpoints::table)
        .values((
            projection_checkpoints::projection_name.eq(name),
            projection_checkpoints::last_event_id.eq(Some(event_id)),
            projection_checkpoints::last_hash.eq(Some(hash)),
            projection_checkpoints::last_sequence.eq(sequence),
        ))
        .on_conflict(projection_checkpoints::projection_name)
        .do_update()
        .set((
            projection_checkpoints::last_event_id.eq(Some(event_id)),
            projection_checkpoints::last_hash.eq(Some(hash)),
            projection_checkpoints::last_sequence.eq(sequence),
        ))
        .execute(conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to update checkpoint: {e}")))?;
    Ok(())
}

/// Single-writer enforcement per projection name (§5 "Projections are
/// single-writer per projection, enforced by advisory lock on projection
/// name"). Held for the remainder of the enclosing transaction.
pub(crate) async fn advisory_lock(conn: &mut AsyncPgConnection, name: &str) -> ArchonResult<()> {
    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind::<diesel::sql_types::Text, _>(name)
        .execute(conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to acquire projection advisory lock: {e}")))?;
    Ok(())
}

pub(crate) async fn truncate_apply_log_and_checkpoint(conn: &mut AsyncPgConnection, name: &str) -> ArchonResult<()> {
    diesel::delete(projection_applies::table.filter(projection_applies::projection_name.eq(name)))
        .execute(conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to clear apply log: {e}")))?;
    diesel::delete(projection_checkpoints::table.filter(projection_checkpoints::projection_name.eq(name)))
        .execute(conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to clear checkpoint: {e}")))?;
    Ok(())
}
