// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Co-signing and the co-signer-threshold auto-escalation path (§3.8,
//! §4.9). The unique constraint on `(petition_id, signer_id)` is the
//! primary duplicate defense (§8 property 5); the rate limiter below is a
//! secondary Sybil-flooding defense, not the source of truth for
//! duplicates.

use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use std::time::Duration;
use uuid::Uuid;

use archon_config::ArchonConfig;
use archon_ledger::{EventStore, PgPool, SigningContext};
use archon_types::{ArchonError, ArchonResult};

use crate::models::{NewCoSign, PetitionState, PetitionType, ESCALATION_SOURCE_CO_SIGNER_THRESHOLD};
use crate::schema::{co_signs, cosign_rate_buckets, petitions};

pub struct CoSignResult {
    pub co_signer_count: i32,
    pub escalated: bool,
}

pub struct CoSignService {
    pool: PgPool,
    store: EventStore,
    config: ArchonConfig,
}

impl CoSignService {
    pub fn new(pool: PgPool, store: EventStore, config: ArchonConfig) -> Self {
        CoSignService { pool, store, config }
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

    /// §4.9 `cosign(petition_id, signer_id)`.
    #[tracing::instrument(skip(self, signer))]
    pub async fn cosign(
        &self,
        petition_id: Uuid,
        signer_id: &str,
        petition_type: PetitionType,
        content_hash: &str,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<CoSignResult> {
        self.check_cosign_rate_limit(signer_id).await?;

        let mut conn = self.conn().await?;
        let (co_signer_count, newly_escalated) = conn
            .transaction::<_, ArchonError, _>(|conn| {
                async move {
                    let inserted = diesel::insert_into(co_signs::table)
                        .values(NewCoSign {
                            petition_id,
                            signer_id: signer_id.to_string(),
                            identity_verified: false,
                            content_hash: content_hash.to_string(),
                        })
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to record co-sign: {e}")))?;

                    if inserted == 0 {
                        return Err(ArchonError::Duplicate(format!(
                            "signer {signer_id} has already co-signed petition {petition_id}"
                        )));
                    }

                    let count: i32 = diesel::update(petitions::table.find(petition_id))
                        .set(petitions::co_signer_count.eq(petitions::co_signer_count + 1))
                        .returning(petitions::co_signer_count)
                        .get_result(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to bump co-signer count: {e}")))?;

                    let threshold = self.config.escalation_threshold(petition_type.as_config_type()) as i32;
                    let mut escalated = false;
                    if count >= threshold {
                        let rows = diesel::update(
                            petitions::table
                                .find(petition_id)
                                .filter(petitions::state.ne(PetitionState::Escalated.as_str())),
                        )
                        .set((
                            petitions::state.eq(PetitionState::Escalated.as_str()),
                            petitions::escalation_source.eq(Some(ESCALATION_SOURCE_CO_SIGNER_THRESHOLD.to_string())),
                        ))
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to auto-escalate petition: {e}")))?;
                        escalated = rows > 0;
                    }

                    Ok((count, escalated))
                }
                .scope_boxed()
            })
            .await?;

        if newly_escalated {
            tracing::warn!(%petition_id, co_signer_count, "petition auto-escalated on co-signer threshold");
            self.store
                .sign_and_append(
                    Uuid::new_v4(),
                    "petition.escalated.committed",
                    "1.0.0",
                    serde_json::json!({
                        "petition_id": petition_id,
                        "escalation_source": ESCALATION_SOURCE_CO_SIGNER_THRESHOLD,
                        "co_signer_count": co_signer_count,
                    }),
                    signer,
                    false,
                )
                .await?;
        }

        Ok(CoSignResult {
            co_signer_count,
            escalated: newly_escalated,
        })
    }

    async fn check_cosign_rate_limit(&self, signer_id: &str) -> ArchonResult<()> {
        let bucket_minute = Utc::now().timestamp() / 60;
        let window_minutes = 60i64;
        let mut conn = self.conn().await?;

        let recent: Vec<i32> = cosign_rate_buckets::table
            .select(cosign_rate_buckets::cosigns)
            .filter(cosign_rate_buckets::signer_id.eq(signer_id))
            .filter(cosign_rate_buckets::bucket_minute.gt(bucket_minute - window_minutes))
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to read co-sign rate buckets: {e}")))?;
        let total: i64 = recent.iter().map(|&n| n as i64).sum();

        if total >= self.config.cosign_rate_limit_per_hour_per_signer as i64 {
            return Err(ArchonError::RateLimited(Duration::from_secs(60)));
        }

        diesel::insert_into(cosign_rate_buckets::table)
            .values((
                cosign_rate_buckets::signer_id.eq(signer_id),
                cosign_rate_buckets::bucket_minute.eq(bucket_minute),
                cosign_rate_buckets::cosigns.eq(1),
            ))
            .on_conflict((cosign_rate_buckets::signer_id, cosign_rate_buckets::bucket_minute))
            .do_update()
            .set(cosign_rate_buckets::cosigns.eq(cosign_rate_buckets::cosigns + 1))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to record co-sign rate bucket: {e}")))?;
        Ok(())
    }

    /// Looks up a petition's current `(petition_type, content_hash)` for
    /// callers that only have the petition id (e.g. an external co-sign
    /// request handler).
    pub async fn petition_context(&self, petition_id: Uuid) -> ArchonResult<(PetitionType, String)> {
        let mut conn = self.conn().await?;
        let row: (String, String) = petitions::table
            .select((petitions::petition_type, petitions::content_hash))
            .find(petition_id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| ArchonError::Storage(format!("failed to load petition: {e}")))?
            .ok_or_else(|| ArchonError::NotFound(format!("petition {petition_id} not found")))?;
        let petition_type = parse_petition_type(&row.0)?;
        Ok((petition_type, row.1))
    }
}

pub(crate) fn parse_petition_type(s: &str) -> ArchonResult<PetitionType> {
    match s {
        "general" => Ok(PetitionType::General),
        "cessation" => Ok(PetitionType::Cessation),
        "grievance" => Ok(PetitionType::Grievance),
        "collaboration" => Ok(PetitionType::Collaboration),
        "meta" => Ok(PetitionType::Meta),
        other => Err(ArchonError::Storage(format!("unrecognized petition_type in database: {other}"))),
    }
}
