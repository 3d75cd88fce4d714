// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Checkpoint persistence (§4.5 "Checkpoints"): a session resumes from its
//! last persisted checkpoint rather than replaying the full transcript.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use archon_types::error::{ArchonError, ArchonResult};

use crate::models::ConclaveCheckpoint;
use crate::schema::conclave_sessions;

/// Persists `checkpoint` and bumps `version` for optimistic concurrency.
/// Called after each debate round and after each vote (§4.5).
pub async fn persist(
    conn: &mut AsyncPgConnection,
    session_id: uuid::Uuid,
    expected_version: i64,
    checkpoint: &ConclaveCheckpoint,
) -> ArchonResult<()> {
    let value = serde_json::to_value(checkpoint)
        .map_err(|e| ArchonError::SchemaInvalid(format!("failed to serialize checkpoint: {e}")))?;

    let updated = diesel::update(
        conclave_sessions::table
            .find(session_id)
            .filter(conclave_sessions::version.eq(expected_version)),
    )
    .set((
        conclave_sessions::checkpoint.eq(Some(value)),
        conclave_sessions::version.eq(expected_version + 1),
        conclave_sessions::updated_at.eq(chrono::Utc::now()),
    ))
    .execute(conn)
    .await
    .map_err(|e| ArchonError::Storage(format!("failed to persist checkpoint: {e}")))?;

    if updated == 0 {
        return Err(ArchonError::OptimisticConflict {
            resource: format!("conclave_sessions:{session_id}"),
            expected: expected_version,
            found: expected_version + 1,
        });
    }
    Ok(())
}
