// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The append-only event store (§4.1). `append` is the single write path
//! for every governance act in the system; every other component either
//! calls it directly or reads from the projections it feeds.

use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use std::time::Duration;
use uuid::Uuid;

use archon_crypto::hashing::{content_hash, hashes_equal, signable_content, HashAlgorithm, GENESIS_HASH};
use archon_crypto::key_registry::KeyRegistry;
use archon_crypto::signing::{verify, EncodedPublicKey, EncodedSignature};
use archon_types::{is_halt_whitelisted, AgentId, ArchonError, ArchonResult, EventType, SchemaVersion, WitnessId};

use crate::key_registry::PgKeyRegistry;
use crate::models::{NewEvent, StoredEvent};
use crate::pool::PgPool;
use crate::schema::{clock_drift_observations, events, halt_state};
use crate::signing_context::SigningContext;

/// Everything a caller must supply to append one event (§3.1, §4.1).
///
/// `claimed_prev_hash` is the chain tip the caller observed and signed
/// over; the store recomputes the true tip independently and rejects with
/// `ChainViolation` if they disagree (§4.1 step 7).
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub event_id: Uuid,
    pub event_type: String,
    pub schema_version: String,
    pub payload: serde_json::Value,
    pub agent_id: String,
    pub witness_id: String,
    pub signature: String,
    pub signing_key_id: String,
    pub witness_signature: String,
    pub witness_signing_key_id: String,
    pub local_timestamp: DateTime<Utc>,
    pub claimed_prev_hash: String,
    pub hash_alg_version: i16,
    pub sig_alg_version: i16,
    pub is_terminal: bool,
}

/// Outcome of `verify_chain` (§4.1 public operations, §8 property 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub broken_at: Option<i64>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl ChainVerification {
    fn ok() -> Self {
        ChainVerification {
            is_valid: true,
            broken_at: None,
            expected: None,
            actual: None,
        }
    }

    fn broken(sequence: i64, expected: String, actual: String) -> Self {
        ChainVerification {
            is_valid: false,
            broken_at: Some(sequence),
            expected: Some(expected),
            actual: Some(actual),
        }
    }
}

pub struct EventStore {
    pool: PgPool,
    key_registry: PgKeyRegistry,
    clock_drift_threshold: Duration,
}

impl EventStore {
    pub fn new(pool: PgPool, clock_drift_threshold: Duration) -> Self {
        EventStore {
            key_registry: PgKeyRegistry::new(pool.clone()),
            pool,
            clock_drift_threshold,
        }
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

    /// §4.1 `append`. See module docs for the field-level contract.
    #[tracing::instrument(skip(self, req), fields(event_type = %req.event_type))]
    pub async fn append(&self, req: AppendRequest) -> ArchonResult<StoredEvent> {
        let event_type = EventType::parse(&req.event_type)?;
        let _schema_version: SchemaVersion = SchemaVersion::parse(&req.schema_version)?;
        let branch = event_type.branch();
        let agent_id = AgentId::parse(&req.agent_id)?;
        let witness_id = WitnessId::parse(&req.witness_id)?;
        let algorithm = HashAlgorithm::from_version(req.hash_alg_version)?;

        let mut conn = self.conn().await?;

        // Step 1/2: halt and terminal gates. Checked up front so a rejected
        // write never touches the signature-verification machinery, and
        // re-checked by the DB trigger as the authoritative backstop.
        let halted = current_halt_reason(&mut conn).await?;
        if let Some(reason) = halted {
            if !is_halt_whitelisted(event_type.as_str()) {
                tracing::warn!(reason = %reason, "rejecting append while halted");
                return Err(ArchonError::Halted { reason });
            }
        }
        if let Some(seq) = terminal_sequence(&mut conn).await? {
            return Err(ArchonError::Terminated { sequence: seq });
        }

        // Step 4/5: signature + witness format, key resolution, crypto verify.
        let signature = EncodedSignature::parse(&req.signature)?;
        let witness_signature = EncodedSignature::parse(&req.witness_signature)?;

        let signing_key = self.key_registry.lookup(&req.signing_key_id).await?;
        if signing_key.agent_id != agent_id {
            return Err(ArchonError::BadSignature(format!(
                "signing_key_id {} does not belong to agent_id {}",
                req.signing_key_id, req.agent_id
            )));
        }
        let witness_key = self.key_registry.lookup(&req.witness_signing_key_id).await?;

        // Step 6/7: assign sequence under the chain. We read the current
        // tip here; the real serialization point is the `IDENTITY` column
        // plus the `enforce_event_chain` trigger, which re-validates this
        // exact comparison inside the same INSERT statement.
        let tip = latest_event_hash(&mut conn).await?;
        let expected_prev_hash = tip.clone().unwrap_or_else(|| GENESIS_HASH.to_string());
        if !hashes_equal(&req.claimed_prev_hash, &expected_prev_hash) {
            return Err(ArchonError::ChainViolation {
                sequence: -1,
                expected: expected_prev_hash,
                actual: req.claimed_prev_hash,
            });
        }

        let signable = signable_content(&event_type, &req.payload, &expected_prev_hash);

        let authority_timestamp = Utc::now();
        if !signing_key.covers(authority_timestamp) {
            return Err(ArchonError::BadSignature(format!(
                "signing key {} is not active at {authority_timestamp}",
                req.signing_key_id
            )));
        }
        verify(signing_key.public_key, &signable, &signature)
            .map_err(|e| ArchonError::BadSignature(format!("agent signature: {e}")))?;

        if !witness_key.covers(authority_timestamp) {
            return Err(ArchonError::BadWitness(format!(
                "witness key {} is not active at {authority_timestamp}",
                req.witness_signing_key_id
            )));
        }
        verify(witness_key.public_key, &signable, &witness_signature)
            .map_err(|e| ArchonError::BadWitness(format!("witness signature: {e}")))?;

        let computed_content_hash = content_hash(algorithm, &event_type, &req.payload, &expected_prev_hash);

        let new_event = NewEvent {
            event_id: req.event_id,
            event_type: event_type.as_str().to_string(),
            branch: branch.as_str().to_string(),
            schema_version: req.schema_version.clone(),
            payload: req.payload.clone(),
            prev_hash: expected_prev_hash.clone(),
            content_hash: computed_content_hash,
            hash_alg_version: req.hash_alg_version,
            sig_alg_version: req.sig_alg_version,
            agent_id: req.agent_id.clone(),
            witness_id: witness_id.as_str().to_string(),
            signature: req.signature.clone(),
            signing_key_id: req.signing_key_id.clone(),
            witness_signature: req.witness_signature.clone(),
            local_timestamp: req.local_timestamp,
            authority_timestamp,
            is_terminal: req.is_terminal,
        };

        let drift = (authority_timestamp - req.local_timestamp).num_seconds().unsigned_abs();
        let drift_threshold_secs = self.clock_drift_threshold.as_secs();

        let stored: StoredEvent = conn
            .transaction::<_, ArchonError, _>(|conn| {
                async move {
                    let stored: StoredEvent = diesel::insert_into(events::table)
                        .values(new_event)
                        .get_result(conn)
                        .await
                        .map_err(map_insert_error)?;

                    if drift > drift_threshold_secs {
                        // Step 8: informational only — never rejects the write.
                        diesel::insert_into(clock_drift_observations::table)
                            .values((
                                clock_drift_observations::event_id.eq(stored.event_id),
                                clock_drift_observations::local_timestamp.eq(stored.local_timestamp),
                                clock_drift_observations::authority_timestamp.eq(stored.authority_timestamp),
                                clock_drift_observations::drift_seconds.eq(drift as f64),
                            ))
                            .execute(conn)
                            .await
                            .map_err(|e| ArchonError::Storage(format!("failed to record clock drift: {e}")))?;
                        tracing::warn!(drift_seconds = drift, "clock drift exceeds threshold");
                    }

                    Ok(stored)
                }
                .scope_boxed()
            })
            .await?;

        if stored.is_terminal {
            tracing::error!(sequence = stored.sequence, "terminal event committed; no further writes possible");
        }

        Ok(stored)
    }

    /// §4.1 `read_range`: finite, ordered, restartable.
    pub async fn read_range(&self, start_seq: i64, end_seq: i64) -> ArchonResult<Vec<StoredEvent>> {
        let mut conn = self.conn().await?;
        events::table
            .filter(events::sequence.ge(start_seq))
            .filter(events::sequence.le(end_seq))
            .order(events::sequence.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to read event range: {e}")))
    }

    /// §4.1 `verify_chain` / §8 property 1.
    pub async fn verify_chain(&self, start_seq: i64, end_seq: i64) -> ArchonResult<ChainVerification> {
        let mut conn = self.conn().await?;
        let lower_bound = if start_seq > 1 { start_seq - 1 } else { start_seq };
        let rows: Vec<StoredEvent> = events::table
            .filter(events::sequence.ge(lower_bound))
            .filter(events::sequence.le(end_seq))
            .order(events::sequence.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load events for verification: {e}")))?;

        let mut prior: Option<&StoredEvent> = None;
        for row in &rows {
            if row.sequence == 1 {
                if row.prev_hash != GENESIS_HASH {
                    return Ok(ChainVerification::broken(
                        row.sequence,
                        GENESIS_HASH.to_string(),
                        row.prev_hash.clone(),
                    ));
                }
            } else if let Some(p) = prior {
                if !hashes_equal(&row.prev_hash, &p.content_hash) {
                    return Ok(ChainVerification::broken(row.sequence, p.content_hash.clone(), row.prev_hash.clone()));
                }
            }

            let event_type = EventType::parse(&row.event_type)?;
            let algorithm = HashAlgorithm::from_version(row.hash_alg_version)?;
            let expected = content_hash(algorithm, &event_type, &row.payload, &row.prev_hash);
            if !hashes_equal(&expected, &row.content_hash) {
                return Ok(ChainVerification::broken(row.sequence, expected, row.content_hash.clone()));
            }

            prior = Some(row);
        }

        Ok(ChainVerification::ok())
    }

    /// §4.1 `is_terminated`.
    pub async fn is_terminated(&self) -> ArchonResult<bool> {
        let mut conn = self.conn().await?;
        Ok(terminal_sequence(&mut conn).await?.is_some())
    }

    /// The current chain tip's `content_hash` (or the genesis value if the
    /// ledger is empty), for callers that need to sign `signable_content`
    /// before constructing an `AppendRequest` (§4.1.1).
    pub async fn current_tip_hash(&self) -> ArchonResult<String> {
        let mut conn = self.conn().await?;
        Ok(latest_event_hash(&mut conn).await?.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Convenience wrapper: signs `payload` under the current chain tip
    /// with both halves of `signer` and appends it. Every non-ledger crate
    /// that publishes governance events (`archon-halt`, `archon-motions`,
    /// `archon-fates`, `archon-conclave`) goes through this rather than
    /// hand-assembling an `AppendRequest`.
    pub async fn sign_and_append(
        &self,
        event_id: Uuid,
        event_type: &str,
        schema_version: &str,
        payload: serde_json::Value,
        signer: &SigningContext<'_>,
        is_terminal: bool,
    ) -> ArchonResult<StoredEvent> {
        let parsed_type = EventType::parse(event_type)?;
        let claimed_prev_hash = self.current_tip_hash().await?;
        let signable = signable_content(&parsed_type, &payload, &claimed_prev_hash);
        self.append(AppendRequest {
            event_id,
            event_type: event_type.to_string(),
            schema_version: schema_version.to_string(),
            payload,
            agent_id: signer.agent_id.to_string(),
            witness_id: signer.witness_id.to_string(),
            signature: signer.agent_identity.sign(&signable).as_str().to_string(),
            signing_key_id: signer.signing_key_id.to_string(),
            witness_signature: signer.witness_identity.sign(&signable).as_str().to_string(),
            witness_signing_key_id: signer.witness_signing_key_id.to_string(),
            local_timestamp: Utc::now(),
            claimed_prev_hash,
            hash_alg_version: 1,
            sig_alg_version: 1,
            is_terminal,
        })
        .await
    }
}

async fn current_halt_reason(
    conn: &mut diesel_async::pooled_connection::bb8::PooledConnection<'_, diesel_async::AsyncPgConnection>,
) -> ArchonResult<Option<String>> {
    let row: Option<(bool, Option<String>)> = halt_state::table
        .select((halt_state::is_halted, halt_state::reason))
        .filter(halt_state::id.eq(1))
        .first(conn)
        .await
        .optional()
        .map_err(|e| ArchonError::Storage(format!("failed to read halt state: {e}")))?;
    match row {
        Some((true, reason)) => Ok(Some(reason.unwrap_or_else(|| "halted".to_string()))),
        _ => Ok(None),
    }
}

async fn terminal_sequence(
    conn: &mut diesel_async::pooled_connection::bb8::PooledConnection<'_, diesel_async::AsyncPgConnection>,
) -> ArchonResult<Option<i64>> {
    events::table
        .select(events::sequence)
        .filter(events::is_terminal.eq(true))
        .first(conn)
        .await
        .optional()
        .map_err(|e| ArchonError::Storage(format!("failed to check terminal state: {e}")))
}

async fn latest_event_hash(
    conn: &mut diesel_async::pooled_connection::bb8::PooledConnection<'_, diesel_async::AsyncPgConnection>,
) -> ArchonResult<Option<String>> {
    events::table
        .select(events::content_hash)
        .order(events::sequence.desc())
        .first(conn)
        .await
        .optional()
        .map_err(|e| ArchonError::Storage(format!("failed to read chain tip: {e}")))
}

fn map_insert_error(e: diesel::result::Error) -> ArchonError {
    let msg = e.to_string();
    if msg.contains("NFR40") {
        ArchonError::Terminated { sequence: -1 }
    } else if msg.contains("chain violation") {
        ArchonError::ChainViolation {
            sequence: -1,
            expected: String::new(),
            actual: String::new(),
        }
    } else {
        ArchonError::Storage(format!("failed to insert event: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_verification_ok_has_no_break_details() {
        let v = ChainVerification::ok();
        assert!(v.is_valid);
        assert!(v.broken_at.is_none());
    }

    #[test]
    fn chain_verification_broken_carries_expected_and_actual() {
        let v = ChainVerification::broken(55, "expected".into(), "actual".into());
        assert!(!v.is_valid);
        assert_eq!(v.broken_at, Some(55));
        assert_eq!(v.expected.as_deref(), Some("expected"));
        assert_eq!(v.actual.as_deref(), Some("actual"));
    }
}
