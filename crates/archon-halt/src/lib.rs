// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The halt circuit and terminal-state authority (§3.4, §4.4). `halt_state`
//! is a singleton row; this crate owns every transition to it and publishes
//! the corresponding `system.halt.*` ledger events. Every long-lived worker
//! loop elsewhere in the workspace re-checks `status()` before each step
//! and halts itself rather than writing through a stale in-process cache.

pub mod models;
pub mod schema;

use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use archon_ledger::{EventStore, PgPool, SigningContext};
use archon_types::{ArchonError, ArchonResult};

use models::{HaltSnapshot, HaltStateRow, Severity};
use schema::halt_state;

pub use models::Severity as HaltSeverity;

pub struct HaltAuthority {
    pool: PgPool,
    store: EventStore,
}

impl HaltAuthority {
    pub fn new(pool: PgPool, store: EventStore) -> Self {
        HaltAuthority { pool, store }
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

    /// §4.4 `status()`.
    pub async fn status(&self) -> ArchonResult<HaltSnapshot> {
        let mut conn = self.conn().await?;
        let row: HaltStateRow = halt_state::table
            .find(1i16)
            .first(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to read halt state: {e}")))?;
        Ok(row.into())
    }

    /// §4.4 `trigger(reason, operator_id, severity)`. Completes the state
    /// transition (DB write + ledger event) within the design's target
    /// budget (spec §4.4: "≤100 ms from API admission to in-flight tasks
    /// transitioning"); this implementation performs one row update and
    /// one ledger append, both single round trips against the same
    /// Postgres instance.
    #[tracing::instrument(skip(self, signer))]
    pub async fn trigger(
        &self,
        reason: &str,
        operator_id: &str,
        severity: Severity,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Uuid> {
        let halt_id = Uuid::new_v4();
        let halted_at = Utc::now();
        let mut conn = self.conn().await?;

        let updated = diesel::update(halt_state::table.find(1i16))
            .filter(halt_state::is_halted.eq(false))
            .set((
                halt_state::is_halted.eq(true),
                halt_state::reason.eq(Some(reason.to_string())),
                halt_state::crisis_event_id.eq(Some(halt_id)),
                halt_state::halted_at.eq(Some(halted_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to set halt state: {e}")))?;

        if updated == 0 {
            // Already halted: idempotent from the caller's point of view,
            // but not a fresh trigger, so no new ledger event is written.
            tracing::warn!("trigger() called while already halted; no-op");
            return Err(ArchonError::Duplicate("system is already halted".to_string()));
        }

        tracing::error!(reason, operator_id, severity = severity.as_str(), "system halt triggered");

        self.store
            .sign_and_append(
                halt_id,
                "system.halt.triggered",
                "1.0.0",
                serde_json::json!({
                    "halt_id": halt_id,
                    "reason": reason,
                    "operator_id": operator_id,
                    "severity": severity.as_str(),
                }),
                signer,
                false,
            )
            .await?;

        Ok(halt_id)
    }

    /// §4.4 `restore(ceremony_id, clear_reason)`. The DB trigger
    /// `enforce_halt_restore_ceremony` is the backstop; this also refuses
    /// up front with a typed error rather than relying solely on a
    /// Postgres exception string.
    #[tracing::instrument(skip(self, signer))]
    pub async fn restore(
        &self,
        ceremony_id: &str,
        clear_reason: &str,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<()> {
        if ceremony_id.trim().is_empty() {
            return Err(ArchonError::SchemaInvalid(
                "restore() requires a non-empty ceremony_id".to_string(),
            ));
        }

        let cleared_at = Utc::now();
        let mut conn = self.conn().await?;

        let updated = diesel::update(halt_state::table.find(1i16))
            .filter(halt_state::is_halted.eq(true))
            .set((
                halt_state::is_halted.eq(false),
                halt_state::cleared_at.eq(Some(cleared_at)),
                halt_state::ceremony_id.eq(Some(ceremony_id.to_string())),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to clear halt state: {e}")))?;

        if updated == 0 {
            return Err(ArchonError::SchemaInvalid("system is not currently halted".to_string()));
        }

        tracing::warn!(ceremony_id, clear_reason, "halt restored via operator ceremony");

        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "system.halt.restored",
                "1.0.0",
                serde_json::json!({
                    "ceremony_id": ceremony_id,
                    "clear_reason": clear_reason,
                }),
                signer,
                false,
            )
            .await?;

        Ok(())
    }

    /// Records the architecturally irreversible cessation event (§4.4
    /// "Terminal event", glossary "Cessation"). There is no corresponding
    /// un-cessation operation; the ledger's `ENFORCE_TERMINAL_EVENT`
    /// trigger refuses every subsequent insert once this commits.
    #[tracing::instrument(skip(self, signer))]
    pub async fn record_cessation(
        &self,
        reason: &str,
        operator_id: &str,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Uuid> {
        let event_id = Uuid::new_v4();
        tracing::error!(reason, operator_id, "recording terminal cessation event");
        self.store
            .sign_and_append(
                event_id,
                "cessation.final.recorded",
                "1.0.0",
                serde_json::json!({
                    "event_id": event_id,
                    "reason": reason,
                    "operator_id": operator_id,
                    "is_terminal": true,
                }),
                signer,
                true,
            )
            .await?;
        Ok(event_id)
    }

    /// Whether the ledger already carries a terminal event (§4.4).
    pub async fn is_terminated(&self) -> ArchonResult<bool> {
        self.store.is_terminated().await
    }
}

#[cfg(test)]
mod tests {
    use super::models::Severity;

    #[test]
    fn severity_strings_are_stable() {
        assert_eq!(Severity::Warning.as_str(), "warning");
        assert_eq!(Severity::Critical.as_str(), "critical");
    }
}
