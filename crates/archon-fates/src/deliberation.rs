// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Three-Fates deliberation protocol (§4.6): session creation, the
//! 4-phase assess/position/cross_examine/vote flow, consensus tallying, and
//! the timeout handler that forces an incomplete session to a defensive
//! outcome.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use archon_jobs::{
    JobHandler, JobQueue, ScheduledJobRow, JOB_TYPE_DELIBERATION_TIMEOUT, JOB_TYPE_REFERRAL_TIMEOUT,
};
use archon_ledger::{EventStore, PgPool, SigningContext};
use archon_motions::schema::petitions;
use archon_motions::{PetitionState, ESCALATION_SOURCE_DELIBERATION, ESCALATION_SOURCE_REFERRAL_TIMEOUT};
use archon_types::agent_invoker::{AgentInvoker, InvocationContext};
use archon_types::error::{ArchonError, ArchonResult};
use archon_types::roster::ArchonId;

use crate::models::{
    DeliberationOutcome, DeliberationPhase, DeliberationSessionRow, NewDeliberationSession,
    NewDissentRecord, DEADLOCK_MAX_ROUNDS_EXCEEDED,
};
use crate::schema::{deliberation_sessions, dissent_records};
use crate::selection::select_adjudicators;

/// §3.7 "every petition that enters deliberation is left at `deliberating`
/// until its Three-Fates session resolves": maps a terminal deliberation
/// outcome onto the petition's own state machine.
fn petition_state_for_outcome(outcome: DeliberationOutcome) -> PetitionState {
    match outcome {
        DeliberationOutcome::Acknowledge => PetitionState::Acknowledged,
        DeliberationOutcome::Refer => PetitionState::Referred,
        DeliberationOutcome::Escalate => PetitionState::Escalated,
        DeliberationOutcome::Defer => PetitionState::Deferred,
        DeliberationOutcome::NoResponse => PetitionState::NoResponse,
    }
}

/// Carries a terminal deliberation outcome onto the owning petition's row.
/// `escalation_source` is only ever set on an `Escalate` outcome, leaving an
/// existing co-signer-threshold escalation untouched on every other path.
async fn apply_outcome_to_petition(
    conn: &mut diesel_async::AsyncPgConnection,
    petition_id: Uuid,
    outcome: DeliberationOutcome,
) -> ArchonResult<()> {
    let state = petition_state_for_outcome(outcome);
    if outcome == DeliberationOutcome::Escalate {
        diesel::update(petitions::table.find(petition_id))
            .set((
                petitions::state.eq(state.as_str()),
                petitions::escalation_source.eq(Some(ESCALATION_SOURCE_DELIBERATION.to_string())),
            ))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to escalate petition {petition_id}: {e}")))?;
    } else {
        diesel::update(petitions::table.find(petition_id))
            .set(petitions::state.eq(state.as_str()))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to update petition {petition_id} state: {e}")))?;
    }
    Ok(())
}

/// §3.7 / §4.6: a petition gets at most 3 rounds before it's declared
/// deadlocked rather than cycling forever.
const MAX_ROUNDS: i32 = 3;

pub struct ThreeFates {
    pool: PgPool,
    store: EventStore,
    invoker: Arc<dyn AgentInvoker>,
    jobs: JobQueue,
    max_concurrent_sessions: i64,
    deliberation_timeout_secs: i64,
    /// §4.7 "referral deadline": a referred petition is re-escalated after
    /// this many deliberation-timeout-length cycles elapse without being
    /// picked back up, unless an extension is granted.
    referral_deadline_cycles: u32,
    referral_deadline_max_extensions: u32,
}

impl ThreeFates {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        store: EventStore,
        invoker: Arc<dyn AgentInvoker>,
        jobs: JobQueue,
        max_concurrent_sessions: i64,
        deliberation_timeout_secs: i64,
        referral_deadline_cycles: u32,
        referral_deadline_max_extensions: u32,
    ) -> Self {
        ThreeFates {
            pool,
            store,
            invoker,
            jobs,
            max_concurrent_sessions,
            deliberation_timeout_secs,
            referral_deadline_cycles,
            referral_deadline_max_extensions,
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

    /// Opens a deliberation session for `petition_id` and registers its
    /// timeout job (§4.6 step 1). `content_hash` seeds adjudicator
    /// selection so re-opening after a crash reselects the same panel.
    #[tracing::instrument(skip(self, jobs, signer))]
    pub async fn open_session(
        &self,
        petition_id: Uuid,
        content_hash: &str,
        jobs: &JobQueue,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Uuid> {
        let session_id = Uuid::new_v4();
        let mut conn = self.conn().await?;
        let adjudicators = select_adjudicators(&mut conn, content_hash, self.max_concurrent_sessions).await?;

        diesel::insert_into(deliberation_sessions::table)
            .values(NewDeliberationSession {
                session_id,
                petition_id,
                adjudicator_1: adjudicators[0].clone(),
                adjudicator_2: adjudicators[1].clone(),
                adjudicator_3: adjudicators[2].clone(),
            })
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to open deliberation session: {e}")))?;

        let timeout_at = Utc::now() + chrono::Duration::seconds(self.deliberation_timeout_secs);
        let job_id = jobs
            .enqueue(
                JOB_TYPE_DELIBERATION_TIMEOUT,
                serde_json::json!({ "session_id": session_id }),
                timeout_at,
            )
            .await?;

        diesel::update(deliberation_sessions::table.find(session_id))
            .set((
                deliberation_sessions::timeout_job_id.eq(Some(job_id)),
                deliberation_sessions::timeout_at.eq(Some(timeout_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to attach timeout job: {e}")))?;

        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "judicial.deliberation.opened",
                "1.0.0",
                serde_json::json!({
                    "session_id": session_id,
                    "petition_id": petition_id,
                    "adjudicators": adjudicators,
                }),
                signer,
                false,
            )
            .await?;

        Ok(session_id)
    }

    /// Enqueues (or re-enqueues, on an extension) the referral-deadline
    /// check for a referred petition (§4.7 `referral_timeout`). One cycle
    /// is measured in deliberation-timeout lengths, the same unit the
    /// session's own timeout job already uses.
    async fn schedule_referral_timeout(&self, petition_id: Uuid, extensions_used: u32) -> ArchonResult<()> {
        let cycle_secs = self.deliberation_timeout_secs * self.referral_deadline_cycles.max(1) as i64;
        let scheduled_for = Utc::now() + chrono::Duration::seconds(cycle_secs);
        self.jobs
            .enqueue(
                JOB_TYPE_REFERRAL_TIMEOUT,
                serde_json::json!({ "petition_id": petition_id, "extensions_used": extensions_used }),
                scheduled_for,
            )
            .await?;
        Ok(())
    }

    /// Lists every session not yet `complete`, for a cadence loop deciding
    /// what to drive forward next.
    pub async fn open_sessions(&self) -> ArchonResult<Vec<DeliberationSessionRow>> {
        let mut conn = self.conn().await?;
        deliberation_sessions::table
            .filter(deliberation_sessions::phase.ne(DeliberationPhase::Complete.as_str()))
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to list open deliberation sessions: {e}")))
    }

    pub async fn get(&self, session_id: Uuid) -> ArchonResult<DeliberationSessionRow> {
        let mut conn = self.conn().await?;
        deliberation_sessions::table
            .find(session_id)
            .first(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load deliberation session: {e}")))
    }

    /// Drives a session from its current phase through to `complete`,
    /// invoking each adjudicator once per phase and once more per voting
    /// round (§4.6 "Phases"/"Consensus rules"). The caller (a cadence loop
    /// in `archon-node`) supplies the petition text once; this method owns
    /// the phase sequencing that `run_phase`/`cast_vote` leave to their
    /// caller.
    #[tracing::instrument(skip(self, subject_text, signer))]
    pub async fn run_session(
        &self,
        session_id: Uuid,
        subject_text: &str,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Option<DeliberationOutcome>> {
        loop {
            let session = self.get(session_id).await?;
            let phase = DeliberationPhase::parse(&session.phase)
                .ok_or_else(|| ArchonError::SchemaInvalid(format!("unknown deliberation phase '{}'", session.phase)))?;

            match phase {
                DeliberationPhase::Complete => {
                    return Ok(session.outcome.as_deref().map(DeliberationOutcome::parse_vote));
                }
                DeliberationPhase::Vote => {
                    for adjudicator in session.adjudicators() {
                        let id: u8 = adjudicator
                            .parse()
                            .map_err(|_| ArchonError::SchemaInvalid(format!("invalid adjudicator id '{adjudicator}'")))?;
                        let context = InvocationContext {
                            subject_text: subject_text.to_string(),
                            round_label: format!("vote:round_{}", session.round_count),
                            recent_history: Vec::new(),
                        };
                        // A failed invocation degrades this adjudicator's
                        // ballot to no_response rather than aborting the
                        // session (§4.5 "Error conditions", mirrored from
                        // Conclave's abstain-on-failure handling).
                        let raw_disposition = match self.invoker.invoke(ArchonId(id), &context).await {
                            Ok(response) => response.text,
                            Err(e) => {
                                tracing::warn!(adjudicator = %adjudicator, error = %e, "agent invoker failed, recording no_response vote");
                                DeliberationOutcome::NoResponse.as_str().to_string()
                            }
                        };
                        if let Some(outcome) = self.cast_vote(session_id, &adjudicator, &raw_disposition, signer).await? {
                            return Ok(Some(outcome));
                        }
                    }
                }
                other => {
                    self.run_phase(session_id, other, subject_text).await?;
                }
            }
        }
    }

    /// Runs one full phase (assess, position, or cross_examine): invokes
    /// all 3 adjudicators, hashes each response into the transcript record,
    /// and advances `phase`. Optimistic concurrency via `version` prevents
    /// two workers from double-advancing the same session (§3.7).
    #[tracing::instrument(skip(self, subject_text))]
    pub async fn run_phase(
        &self,
        session_id: Uuid,
        phase: DeliberationPhase,
        subject_text: &str,
    ) -> ArchonResult<()> {
        let session = self.get(session_id).await?;
        if session.phase != phase.as_str() {
            return Err(ArchonError::SchemaInvalid(format!(
                "session {session_id} is in phase {}, not {}",
                session.phase,
                phase.as_str()
            )));
        }

        let mut transcript = session.phase_transcript_hashes.clone();
        let round_label = format!("{}:round_{}", phase.as_str(), session.round_count);

        for adjudicator in session.adjudicators() {
            let id: u8 = adjudicator
                .parse()
                .map_err(|_| ArchonError::SchemaInvalid(format!("invalid adjudicator id '{adjudicator}'")))?;
            let archon_id = ArchonId(id);
            let context = InvocationContext {
                subject_text: subject_text.to_string(),
                round_label: round_label.clone(),
                recent_history: Vec::new(),
            };
            // A failed invocation degrades this adjudicator to absent for
            // the phase rather than aborting the whole session, matching
            // Conclave's handling of the same failure mode.
            let entry = match self.invoker.invoke(archon_id, &context).await {
                Ok(response) => serde_json::json!(blake3::hash(response.text.as_bytes()).to_hex().to_string()),
                Err(e) => {
                    tracing::warn!(adjudicator = %adjudicator, error = %e, "agent invoker failed, marking absent for phase");
                    serde_json::json!("absent-for-round")
                }
            };
            transcript
                .as_object_mut()
                .expect("value is always a JSON object")
                .insert(format!("{adjudicator}:{round_label}"), entry);
        }

        let next_phase = next_phase(phase);
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            deliberation_sessions::table
                .find(session_id)
                .filter(deliberation_sessions::version.eq(session.version)),
        )
        .set((
            deliberation_sessions::phase.eq(next_phase.as_str()),
            deliberation_sessions::phase_transcript_hashes.eq(transcript),
            deliberation_sessions::version.eq(session.version + 1),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to advance phase: {e}")))?;

        if updated == 0 {
            return Err(ArchonError::OptimisticConflict {
                resource: format!("deliberation_sessions:{session_id}"),
                expected: session.version,
                found: session.version + 1,
            });
        }
        Ok(())
    }

    /// Records one adjudicator's disposition for the vote phase (§4.6 step
    /// 4). Once all 3 are in, tallies consensus and either completes the
    /// session or increments `round_count` and loops back to `assess`.
    #[tracing::instrument(skip(self, signer))]
    pub async fn cast_vote(
        &self,
        session_id: Uuid,
        adjudicator: &str,
        raw_disposition: &str,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Option<DeliberationOutcome>> {
        let session = self.get(session_id).await?;
        if session.phase != DeliberationPhase::Vote.as_str() {
            return Err(ArchonError::SchemaInvalid(format!(
                "session {session_id} is not in the vote phase"
            )));
        }
        if !session.adjudicators().contains(&adjudicator.to_string()) {
            return Err(ArchonError::SchemaInvalid(format!(
                "{adjudicator} is not a panel member of session {session_id}"
            )));
        }

        let disposition = DeliberationOutcome::parse_vote(raw_disposition);
        let mut votes = session.votes.clone();
        votes
            .as_object_mut()
            .expect("value is always a JSON object")
            .insert(adjudicator.to_string(), serde_json::json!(disposition.as_str()));

        let mut conn = self.conn().await?;
        let updated = diesel::update(
            deliberation_sessions::table
                .find(session_id)
                .filter(deliberation_sessions::version.eq(session.version)),
        )
        .set((
            deliberation_sessions::votes.eq(votes.clone()),
            deliberation_sessions::version.eq(session.version + 1),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to record vote: {e}")))?;

        if updated == 0 {
            return Err(ArchonError::OptimisticConflict {
                resource: format!("deliberation_sessions:{session_id}"),
                expected: session.version,
                found: session.version + 1,
            });
        }

        let votes_obj = votes.as_object().cloned().unwrap_or_default();
        if votes_obj.len() < 3 {
            return Ok(None);
        }

        drop(conn);
        self.finalize_round(session_id, signer).await
    }

    /// Tallies a completed round of 3 votes (§4.6 step 5 / §3.7 consensus
    /// rules): 3-0 unanimous, 2-1 majority with dissent recorded, or 1-1-1
    /// with a round increment up to `MAX_ROUNDS`.
    async fn finalize_round(
        &self,
        session_id: Uuid,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Option<DeliberationOutcome>> {
        let session = self.get(session_id).await?;
        let votes_obj = session.votes.as_object().cloned().unwrap_or_default();

        let mut tally: Vec<(String, DeliberationOutcome)> = votes_obj
            .iter()
            .map(|(k, v)| (k.clone(), DeliberationOutcome::parse_vote(v.as_str().unwrap_or(""))))
            .collect();
        tally.sort_by(|a, b| a.0.cmp(&b.0));

        let mut conn = self.conn().await?;

        let consensus = majority_disposition(&tally);
        match consensus {
            Some((winner, dissenter)) => {
                if let Some((dissent_id, dissent_disposition)) = dissenter {
                    self.record_dissent(&mut conn, session_id, session.petition_id, &dissent_id, dissent_disposition, winner, signer)
                        .await?;
                }
                self.complete_session(&mut conn, session_id, session.petition_id, winner).await?;
                drop(conn);
                if winner == DeliberationOutcome::Refer {
                    self.schedule_referral_timeout(session.petition_id, 0).await?;
                }
                self.emit_outcome(session_id, session.petition_id, winner, false, signer).await?;
                Ok(Some(winner))
            }
            None => {
                let new_round = session.round_count + 1;
                if new_round >= MAX_ROUNDS {
                    // The deliberation_deadlock_implies_escalate constraint
                    // requires a deadlocked session's outcome to be
                    // 'escalate': an unresolved panel is handed up rather
                    // than quietly deferred.
                    self.deadlock_session(&mut conn, session_id, session.petition_id).await?;
                    self.emit_outcome(session_id, session.petition_id, DeliberationOutcome::Escalate, true, signer)
                        .await?;
                    return Ok(Some(DeliberationOutcome::Escalate));
                }

                let mut votes_by_round = session.votes_by_round.clone();
                votes_by_round
                    .as_array_mut()
                    .expect("votes_by_round is always a JSON array")
                    .push(serde_json::json!({ "round": session.round_count, "votes": session.votes }));

                diesel::update(
                    deliberation_sessions::table
                        .find(session_id)
                        .filter(deliberation_sessions::version.eq(session.version)),
                )
                .set((
                    deliberation_sessions::phase.eq(DeliberationPhase::Assess.as_str()),
                    deliberation_sessions::votes.eq(serde_json::json!({})),
                    deliberation_sessions::votes_by_round.eq(votes_by_round),
                    deliberation_sessions::round_count.eq(new_round),
                    deliberation_sessions::version.eq(session.version + 1),
                ))
                .execute(&mut conn)
                .await
                .map_err(|e| ArchonError::Storage(format!("failed to increment round: {e}")))?;
                tracing::info!(session_id = %session_id, new_round, "deliberation split 1-1-1, starting next round");
                Ok(None)
            }
        }
    }

    async fn complete_session(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        session_id: Uuid,
        petition_id: Uuid,
        outcome: DeliberationOutcome,
    ) -> ArchonResult<()> {
        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                diesel::update(deliberation_sessions::table.find(session_id))
                    .set((
                        deliberation_sessions::phase.eq(DeliberationPhase::Complete.as_str()),
                        deliberation_sessions::outcome.eq(Some(outcome.as_str().to_string())),
                        deliberation_sessions::completed_at.eq(Some(Utc::now())),
                    ))
                    .execute(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to complete session: {e}")))?;
                apply_outcome_to_petition(conn, petition_id, outcome).await
            }
            .scope_boxed()
        })
        .await
    }

    async fn deadlock_session(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        session_id: Uuid,
        petition_id: Uuid,
    ) -> ArchonResult<()> {
        conn.transaction::<_, ArchonError, _>(|conn| {
            async move {
                diesel::update(deliberation_sessions::table.find(session_id))
                    .set((
                        deliberation_sessions::phase.eq(DeliberationPhase::Complete.as_str()),
                        deliberation_sessions::outcome.eq(Some(DeliberationOutcome::Escalate.as_str().to_string())),
                        deliberation_sessions::is_deadlocked.eq(true),
                        deliberation_sessions::deadlock_reason.eq(Some(DEADLOCK_MAX_ROUNDS_EXCEEDED.to_string())),
                        deliberation_sessions::completed_at.eq(Some(Utc::now())),
                    ))
                    .execute(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to deadlock session: {e}")))?;
                apply_outcome_to_petition(conn, petition_id, DeliberationOutcome::Escalate).await
            }
            .scope_boxed()
        })
        .await?;
        tracing::warn!(session_id = %session_id, "deliberation deadlocked after max rounds");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_dissent(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        session_id: Uuid,
        petition_id: Uuid,
        dissent_adjudicator_id: &str,
        dissent_disposition: DeliberationOutcome,
        majority_disposition: DeliberationOutcome,
        _signer: &SigningContext<'_>,
    ) -> ArchonResult<()> {
        let rationale = format!(
            "adjudicator {dissent_adjudicator_id} dissented from majority disposition {}",
            majority_disposition.as_str()
        );
        let rationale_hash = blake3::hash(rationale.as_bytes()).to_hex().to_string();

        diesel::insert_into(dissent_records::table)
            .values(NewDissentRecord {
                session_id,
                petition_id,
                dissent_adjudicator_id: dissent_adjudicator_id.to_string(),
                dissent_disposition: dissent_disposition.as_str().to_string(),
                majority_disposition: majority_disposition.as_str().to_string(),
                rationale,
                rationale_hash,
            })
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to record dissent: {e}")))?;

        diesel::update(deliberation_sessions::table.find(session_id))
            .set(deliberation_sessions::dissent_adjudicator_id.eq(Some(dissent_adjudicator_id.to_string())))
            .execute(conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to attach dissent marker: {e}")))?;

        Ok(())
    }

    async fn emit_outcome(
        &self,
        session_id: Uuid,
        petition_id: Uuid,
        outcome: DeliberationOutcome,
        deadlocked: bool,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<()> {
        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "judicial.deliberation.completed",
                "1.0.0",
                serde_json::json!({
                    "session_id": session_id,
                    "petition_id": petition_id,
                    "outcome": outcome.as_str(),
                    "deadlocked": deadlocked,
                }),
                signer,
                false,
            )
            .await?;
        Ok(())
    }
}

fn next_phase(phase: DeliberationPhase) -> DeliberationPhase {
    match phase {
        DeliberationPhase::Assess => DeliberationPhase::Position,
        DeliberationPhase::Position => DeliberationPhase::CrossExamine,
        DeliberationPhase::CrossExamine => DeliberationPhase::Vote,
        DeliberationPhase::Vote => DeliberationPhase::Complete,
        DeliberationPhase::Complete => DeliberationPhase::Complete,
    }
}

/// §3.7 consensus rules applied to 3 recorded votes: unanimous or 2-1
/// majority resolve with a winner (and the lone dissenter, if any); a 1-1-1
/// split resolves to `None` so the caller increments the round.
fn majority_disposition(
    tally: &[(String, DeliberationOutcome)],
) -> Option<(DeliberationOutcome, Option<(String, DeliberationOutcome)>)> {
    if tally.len() != 3 {
        return None;
    }
    let (id0, v0) = &tally[0];
    let (id1, v1) = &tally[1];
    let (id2, v2) = &tally[2];

    if v0 == v1 && v1 == v2 {
        return Some((*v0, None));
    }
    if v0 == v1 {
        return Some((*v0, Some((id2.clone(), *v2))));
    }
    if v0 == v2 {
        return Some((*v0, Some((id1.clone(), *v1))));
    }
    if v1 == v2 {
        return Some((*v1, Some((id0.clone(), *v0))));
    }
    None
}

/// The `deliberation_timeout` job handler (§4.6 step 6, §4.7). Idempotent:
/// a session already past the vote phase is left untouched, so a retried
/// or duplicated timeout job is a no-op.
pub struct DeliberationTimeoutHandler {
    pool: PgPool,
    store: EventStore,
}

impl DeliberationTimeoutHandler {
    pub fn new(pool: PgPool, store: EventStore) -> Self {
        DeliberationTimeoutHandler { pool, store }
    }
}

#[async_trait::async_trait]
impl JobHandler for DeliberationTimeoutHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_DELIBERATION_TIMEOUT
    }

    #[tracing::instrument(skip(self, job))]
    async fn handle(&self, job: &ScheduledJobRow) -> ArchonResult<()> {
        let session_id: Uuid = job
            .payload
            .get("session_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ArchonError::SchemaInvalid("deliberation_timeout job missing session_id".to_string()))?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to acquire connection: {e}")))?;

        let petition_id: Option<Uuid> = conn
            .transaction::<_, ArchonError, _>(|conn| {
                async move {
                    let session: DeliberationSessionRow = deliberation_sessions::table
                        .find(session_id)
                        .first(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to load session for timeout: {e}")))?;

                    if session.phase == DeliberationPhase::Complete.as_str() {
                        return Ok(None);
                    }

                    diesel::update(
                        deliberation_sessions::table
                            .find(session_id)
                            .filter(deliberation_sessions::version.eq(session.version)),
                    )
                    .set((
                        deliberation_sessions::phase.eq(DeliberationPhase::Complete.as_str()),
                        deliberation_sessions::outcome.eq(Some(DeliberationOutcome::Escalate.as_str().to_string())),
                        deliberation_sessions::timed_out.eq(true),
                        deliberation_sessions::completed_at.eq(Some(Utc::now())),
                        deliberation_sessions::version.eq(session.version + 1),
                    ))
                    .execute(conn)
                    .await
                    .map_err(|e| ArchonError::Storage(format!("failed to force-complete timed-out session: {e}")))?;

                    apply_outcome_to_petition(conn, session.petition_id, DeliberationOutcome::Escalate).await?;

                    Ok(Some(session.petition_id))
                }
                .scope_boxed()
            })
            .await?;

        if let Some(petition_id) = petition_id {
            tracing::warn!(session_id = %session_id, %petition_id, "deliberation session timed out, escalating defensively");
        }
        Ok(())
    }
}

/// The `referral_timeout` job handler (§4.7): checks whether a referred
/// petition was ever picked back up. Idempotent — a petition no longer in
/// `referred` (already escalated, adopted, or withdrawn) is left alone, so
/// a retried or duplicated job is a no-op.
pub struct ReferralTimeoutHandler {
    pool: PgPool,
    jobs: JobQueue,
    cycle_secs: i64,
    max_extensions: u32,
}

impl ReferralTimeoutHandler {
    pub fn new(pool: PgPool, jobs: JobQueue, cycle_secs: i64, max_extensions: u32) -> Self {
        ReferralTimeoutHandler { pool, jobs, cycle_secs, max_extensions }
    }
}

#[async_trait::async_trait]
impl JobHandler for ReferralTimeoutHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_REFERRAL_TIMEOUT
    }

    #[tracing::instrument(skip(self, job))]
    async fn handle(&self, job: &ScheduledJobRow) -> ArchonResult<()> {
        let petition_id: Uuid = job
            .payload
            .get("petition_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ArchonError::SchemaInvalid("referral_timeout job missing petition_id".to_string()))?;
        let extensions_used = job.payload.get("extensions_used").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to acquire connection: {e}")))?;

        // `None` = petition already left `referred` (adopted, withdrawn, or
        // already escalated), a no-op. `Some(true)` = extension granted,
        // reschedule. `Some(false)` = extensions exhausted, just escalated.
        let outcome: Option<bool> = conn
            .transaction::<_, ArchonError, _>(|conn| {
                async move {
                    let petition: archon_motions::models::PetitionRow = petitions::table
                        .find(petition_id)
                        .first(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to load petition for referral timeout: {e}")))?;

                    if petition.state != PetitionState::Referred.as_str() {
                        return Ok(None);
                    }

                    if extensions_used >= self.max_extensions {
                        diesel::update(
                            petitions::table.find(petition_id).filter(petitions::state.eq(PetitionState::Referred.as_str())),
                        )
                        .set((
                            petitions::state.eq(PetitionState::Escalated.as_str()),
                            petitions::escalation_source.eq(Some(ESCALATION_SOURCE_REFERRAL_TIMEOUT.to_string())),
                        ))
                        .execute(conn)
                        .await
                        .map_err(|e| ArchonError::Storage(format!("failed to escalate referred petition {petition_id}: {e}")))?;
                        return Ok(Some(false));
                    }

                    Ok(Some(true))
                }
                .scope_boxed()
            })
            .await?;

        match outcome {
            None => {
                tracing::debug!(%petition_id, "referral timeout fired for a petition no longer referred, skipping");
            }
            Some(false) => {
                tracing::warn!(%petition_id, "referral deadline exceeded, escalating");
            }
            Some(true) => {
                let scheduled_for = Utc::now() + chrono::Duration::seconds(self.cycle_secs);
                self.jobs
                    .enqueue(
                        JOB_TYPE_REFERRAL_TIMEOUT,
                        serde_json::json!({ "petition_id": petition_id, "extensions_used": extensions_used + 1 }),
                        scheduled_for,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanimous_vote_has_no_dissenter() {
        let tally = vec![
            ("a".to_string(), DeliberationOutcome::Acknowledge),
            ("b".to_string(), DeliberationOutcome::Acknowledge),
            ("c".to_string(), DeliberationOutcome::Acknowledge),
        ];
        let (winner, dissenter) = majority_disposition(&tally).unwrap();
        assert_eq!(winner, DeliberationOutcome::Acknowledge);
        assert!(dissenter.is_none());
    }

    #[test]
    fn two_one_split_has_dissenter() {
        let tally = vec![
            ("a".to_string(), DeliberationOutcome::Refer),
            ("b".to_string(), DeliberationOutcome::Refer),
            ("c".to_string(), DeliberationOutcome::Escalate),
        ];
        let (winner, dissenter) = majority_disposition(&tally).unwrap();
        assert_eq!(winner, DeliberationOutcome::Refer);
        assert_eq!(dissenter.unwrap().0, "c");
    }

    #[test]
    fn one_one_one_split_has_no_majority() {
        let tally = vec![
            ("a".to_string(), DeliberationOutcome::Refer),
            ("b".to_string(), DeliberationOutcome::Escalate),
            ("c".to_string(), DeliberationOutcome::Defer),
        ];
        assert!(majority_disposition(&tally).is_none());
    }

    #[test]
    fn petition_state_for_outcome_maps_every_variant() {
        assert_eq!(petition_state_for_outcome(DeliberationOutcome::Acknowledge), PetitionState::Acknowledged);
        assert_eq!(petition_state_for_outcome(DeliberationOutcome::Refer), PetitionState::Referred);
        assert_eq!(petition_state_for_outcome(DeliberationOutcome::Escalate), PetitionState::Escalated);
        assert_eq!(petition_state_for_outcome(DeliberationOutcome::Defer), PetitionState::Deferred);
        assert_eq!(petition_state_for_outcome(DeliberationOutcome::NoResponse), PetitionState::NoResponse);
    }
}
