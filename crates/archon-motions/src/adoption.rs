// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The adoption bridge (§4.6 "Adoption provenance immutability", §4.9
//! "Adoption bridge"): a King turns an escalated petition into a Motion.
//! The write is atomic across both tables; a motion-queue write failure
//! rolls back the adoption fields, since an adopted-but-unqueued petition
//! would be unobservable to the Conclave.

use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use archon_ledger::{EventStore, PgPool, SigningContext};
use archon_types::{ArchonError, ArchonResult};

use crate::models::{ConsensusTier, MotionStatus, MotionType, NewMotion, NewMotionQueueEntry, PetitionState, QueueEntryStatus};
use crate::schema::{motion_queue_entries, motions, petitions};

pub struct AdoptionBridge {
    pool: PgPool,
    store: EventStore,
}

impl AdoptionBridge {
    pub fn new(pool: PgPool, store: EventStore) -> Self {
        AdoptionBridge { pool, store }
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

    /// §4.9 "Adoption bridge". `petition_id` must currently be `escalated`;
    /// produces a new `Motion` of `motion_type`, enqueues it at
    /// `consensus_tier`, and writes the immutable adoption fields on the
    /// petition, all in one transaction.
    #[tracing::instrument(skip(self, signer))]
    pub async fn adopt(
        &self,
        petition_id: Uuid,
        king_id: &str,
        title: &str,
        motion_type: MotionType,
        consensus_tier: ConsensusTier,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Uuid> {
        let mut conn = self.conn().await?;
        let motion_id = Uuid::new_v4();

        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                let petition_body: String = petitions::table
                    .select(petitions::body)
                    .filter(petitions::petition_id.eq(petition_id))
                    .filter(petitions::state.eq(PetitionState::Escalated.as_str()))
                    .first(conn)
                    .await
                    .map_err(|_| {
                        ArchonError::SchemaInvalid(format!(
                            "petition {petition_id} is not in escalated state and cannot be adopted"
                        ))
                    })?;

                let adopted_at = chrono::Utc::now();
                let updated = diesel::update(
                    petitions::table
                        .find(petition_id)
                        .filter(petitions::adopted_as_motion_id.is_null()),
                )
                .set((
                    petitions::state.eq(PetitionState::Adopted.as_str()),
                    petitions::adopted_as_motion_id.eq(Some(motion_id)),
                    petitions::adopted_by_king_id.eq(Some(king_id.to_string())),
                    petitions::adopted_at.eq(Some(adopted_at)),
                ))
                .execute(conn)
                .await
                .map_err(|e| ArchonError::Storage(format!("failed to write adoption fields: {e}")))?;

                if updated == 0 {
                    return Err(ArchonError::Duplicate(format!(
                        "petition {petition_id} has already been adopted"
                    )));
                }

                diesel::insert_into(motions::table)
                    .values(NewMotion {
                        motion_id,
                        title: title.to_string(),
                        body: petition_body,
                        motion_type: motion_type.as_str().to_string(),
                        proposer_id: king_id.to_string(),
                        seconder_id: None,
                        status: MotionStatus::Proposed.as_str().to_string(),
                    })
                    .execute(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to create adopted motion: {e}")))?;

                let entry_id = Uuid::new_v4();
                diesel::insert_into(motion_queue_entries::table)
                    .values(NewMotionQueueEntry {
                        entry_id,
                        motion_id,
                        consensus_tier: consensus_tier.as_str().to_string(),
                        endorsement_count: 0,
                        status: QueueEntryStatus::Pending.as_str().to_string(),
                    })
                    .execute(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to enqueue adopted motion: {e}")))?;

                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        tracing::info!(%petition_id, %motion_id, king_id, "petition adopted as motion");
        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "petition.adopted.committed",
                "1.0.0",
                serde_json::json!({
                    "petition_id": petition_id,
                    "motion_id": motion_id,
                    "adopted_by_king_id": king_id,
                }),
                signer,
                false,
            )
            .await?;

        Ok(motion_id)
    }
}
