// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The petition intake pipeline (§4.9): a sequential run of gates, ending
//! in a two-phase `petition.received.intent` / `.committed` emission
//! (§4.10).

use chrono::Utc;
use diesel::{BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use std::time::Duration;
use uuid::Uuid;

use archon_config::ArchonConfig;
use archon_halt::HaltAuthority;
use archon_ledger::{EventStore, PgPool, SigningContext};
use archon_types::{ArchonError, ArchonResult};

use crate::models::{NewPetition, PetitionRow, PetitionState, PetitionType};
use crate::schema::{petitions, submission_rate_buckets};

/// A validated, not-yet-persisted petition submission (§4.9 gate 1,
/// "Schema gate: validate request shape").
pub struct PetitionSubmission {
    pub petition_type: PetitionType,
    pub body: String,
    pub submitter_id: Option<String>,
    pub realm: String,
}

impl PetitionSubmission {
    fn validate(&self) -> ArchonResult<()> {
        if self.body.trim().is_empty() {
            return Err(ArchonError::SchemaInvalid("petition body must not be empty".to_string()));
        }
        if self.body.chars().count() > 10_000 {
            return Err(ArchonError::SchemaInvalid("petition body exceeds 10,000 characters".to_string()));
        }
        if self.realm.trim().is_empty() {
            return Err(ArchonError::SchemaInvalid("petition realm must not be empty".to_string()));
        }
        Ok(())
    }
}

/// BLAKE3 content hash over text + submitter + type (§4.9 gate 5), distinct
/// from the ledger's own SHA-256 `content_hash` over `signable_content`.
pub fn petition_content_hash(submission: &PetitionSubmission) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(submission.body.as_bytes());
    hasher.update(b"|");
    hasher.update(submission.submitter_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(submission.petition_type.as_str().as_bytes());
    hasher.finalize().to_hex().to_string()
}

pub struct PetitionIntake {
    pool: PgPool,
    store: EventStore,
    config: ArchonConfig,
}

impl PetitionIntake {
    pub fn new(pool: PgPool, store: EventStore, config: ArchonConfig) -> Self {
        PetitionIntake { pool, store, config }
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

    /// Runs the full intake pipeline (§4.9 gates 1-7) and returns the
    /// persisted petition.
    #[tracing::instrument(skip(self, submission, halt, signer))]
    pub async fn submit(
        &self,
        submission: PetitionSubmission,
        halt: &HaltAuthority,
        current_deliberation_queue_depth: i64,
        deliberation_queue_ceiling: i64,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<PetitionRow> {
        // Gate 1: schema.
        submission.validate()?;

        // Gate 2: halt.
        let snapshot = halt.status().await?;
        if snapshot.is_halted {
            return Err(ArchonError::Halted {
                reason: snapshot.reason.unwrap_or_else(|| "system halted".to_string()),
            });
        }

        // Gate 3: rate limit.
        if let Some(submitter_id) = &submission.submitter_id {
            self.check_submission_rate_limit(submitter_id).await?;
        }

        // Gate 4: queue capacity (with hysteresis: reject only strictly
        // above the ceiling, so a queue sitting exactly at capacity does
        // not flap between accept/reject on racing reads).
        if current_deliberation_queue_depth > deliberation_queue_ceiling {
            return Err(ArchonError::QueueAtCapacity(Duration::from_secs(30)));
        }

        // Gate 5: content-hash duplicate.
        let content_hash = petition_content_hash(&submission);
        self.reject_if_duplicate(&content_hash).await?;

        // Gate 6: persist.
        let petition_id = Uuid::new_v4();
        let mut conn = self.conn().await?;
        let row: PetitionRow = diesel::insert_into(petitions::table)
            .values(NewPetition {
                petition_id,
                petition_type: submission.petition_type.as_str().to_string(),
                body: submission.body.clone(),
                submitter_id: submission.submitter_id.clone(),
                state: PetitionState::Received.as_str().to_string(),
                content_hash: content_hash.clone(),
                realm: submission.realm.clone(),
            })
            .get_result(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to persist petition: {e}")))?;

        // Gate 7: two-phase emission.
        let intent_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "petition_id": petition_id,
            "petition_type": submission.petition_type.as_str(),
            "content_hash": content_hash,
            "realm": submission.realm,
            "submitter_id": submission.submitter_id,
        });
        self.store
            .sign_and_append(intent_id, "petition.received.intent", "1.0.0", payload.clone(), signer, false)
            .await?;

        match self
            .store
            .sign_and_append(Uuid::new_v4(), "petition.received.committed", "1.0.0", payload, signer, false)
            .await
        {
            Ok(_) => Ok(row),
            Err(e) => {
                self.store
                    .sign_and_append(
                        Uuid::new_v4(),
                        "petition.received.failed",
                        "1.0.0",
                        serde_json::json!({"petition_id": petition_id, "reason": e.to_string()}),
                        signer,
                        false,
                    )
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    /// Claims up to `max_items` petitions still `received` and transitions
    /// them to `deliberating` (§4.6 "For each petition entering
    /// deliberating, a mini-Conclave of exactly three adjudicators runs").
    /// `SELECT ... FOR UPDATE SKIP LOCKED`, same claiming idiom as
    /// `MotionQueue::select_for_conclave`, so two concurrent callers never
    /// open two deliberation sessions for the same petition.
    pub async fn select_for_deliberation(&self, max_items: i64) -> ArchonResult<Vec<PetitionRow>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                let selected: Vec<PetitionRow> = petitions::table
                    .filter(petitions::state.eq(PetitionState::Received.as_str()))
                    .order(petitions::created_at.asc())
                    .limit(max_items)
                    .for_update()
                    .skip_locked()
                    .load(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to select petitions for deliberation: {e}")))?;

                for petition in &selected {
                    diesel::update(petitions::table.find(petition.petition_id))
                        .set(petitions::state.eq(PetitionState::Deliberating.as_str()))
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to transition petition to deliberating: {e}")))?;
                }

                Ok(selected)
            }
            .scope_boxed()
        })
        .await
    }

    /// Looks up a petition's text by id, for callers driving deliberation
    /// that only hold the petition id (e.g. the Three-Fates cadence loop).
    pub async fn body_of(&self, petition_id: Uuid) -> ArchonResult<String> {
        let mut conn = self.conn().await?;
        petitions::table
            .select(petitions::body)
            .find(petition_id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| ArchonError::Storage(format!("failed to load petition body: {e}")))?
            .ok_or_else(|| ArchonError::NotFound(format!("petition {petition_id} not found")))
    }

    async fn check_submission_rate_limit(&self, submitter_id: &str) -> ArchonResult<()> {
        let bucket_minute = Utc::now().timestamp() / 60;
        let window_minutes = 60i64;
        let mut conn = self.conn().await?;

        let recent: Vec<i32> = submission_rate_buckets::table
            .select(submission_rate_buckets::submissions)
            .filter(submission_rate_buckets::submitter_id.eq(submitter_id))
            .filter(submission_rate_buckets::bucket_minute.gt(bucket_minute - window_minutes))
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to read submission rate buckets: {e}")))?;
        let total: i64 = recent.iter().map(|&n| n as i64).sum();

        if total >= self.config.rate_limit_per_hour_per_submitter as i64 {
            return Err(ArchonError::RateLimited(Duration::from_secs(60)));
        }

        diesel::insert_into(submission_rate_buckets::table)
            .values((
                submission_rate_buckets::submitter_id.eq(submitter_id),
                submission_rate_buckets::bucket_minute.eq(bucket_minute),
                submission_rate_buckets::submissions.eq(1),
            ))
            .on_conflict((submission_rate_buckets::submitter_id, submission_rate_buckets::bucket_minute))
            .do_update()
            .set(submission_rate_buckets::submissions.eq(submission_rate_buckets::submissions + 1))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to record submission rate bucket: {e}")))?;
        Ok(())
    }

    async fn reject_if_duplicate(&self, content_hash: &str) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        let existing: Option<Uuid> = petitions::table
            .select(petitions::petition_id)
            .filter(petitions::content_hash.eq(content_hash))
            .filter(
                petitions::state
                    .ne(PetitionState::Withdrawn.as_str())
                    .and(petitions::state.ne(PetitionState::Adopted.as_str()))
                    .and(petitions::state.ne(PetitionState::NoResponse.as_str())),
            )
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| ArchonError::Storage(format!("failed to check duplicate petition: {e}")))?;
        if existing.is_some() {
            return Err(ArchonError::Duplicate(format!(
                "an active petition with content_hash {content_hash} already exists"
            )));
        }
        Ok(())
    }
}
