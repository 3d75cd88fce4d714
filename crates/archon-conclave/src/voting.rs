// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Voting mechanics (§4.5 step 4): bounded-concurrency vote collection and
//! optional three-channel secretary/witness validation.

use std::collections::HashMap;
use std::sync::Arc;

use archon_types::agent_invoker::{AgentInvoker, InvocationContext};
use archon_types::error::ArchonResult;
use archon_types::roster::ArchonId;
use tokio::sync::Semaphore;

use crate::models::VoteChoice;

/// Collects one vote per present Archon, bounded by `concurrency` (0 means
/// unbounded — every vote is invoked concurrently, §4.5 step 4 / config
/// `voting_concurrency`).
pub async fn collect_votes(
    invoker: Arc<dyn AgentInvoker>,
    present: &[String],
    motion_text: &str,
    concurrency: u32,
    three_channel: bool,
) -> ArchonResult<HashMap<String, VoteChoice>> {
    let semaphore = if concurrency == 0 {
        None
    } else {
        Some(Arc::new(Semaphore::new(concurrency as usize)))
    };

    let mut handles = Vec::with_capacity(present.len());
    for archon_id in present {
        let invoker = invoker.clone();
        let archon_id = archon_id.clone();
        let motion_text = motion_text.to_string();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = match &semaphore {
                Some(s) => Some(s.clone().acquire_owned().await),
                None => None,
            };
            let vote = cast_one_vote(invoker, &archon_id, &motion_text, three_channel).await;
            (archon_id, vote)
        }));
    }

    let mut votes = HashMap::with_capacity(present.len());
    for handle in handles {
        let (archon_id, vote) = handle
            .await
            .map_err(|e| archon_types::error::ArchonError::Storage(format!("vote task panicked: {e}")))?;
        votes.insert(archon_id, vote);
    }
    Ok(votes)
}

/// Invokes a single participant's vote prompt, optionally re-validated by
/// two independent "secretary" invocations with a "witness" tiebreaker
/// (§4.5 step 4). Each channel is its own call against the invoker (which
/// itself carries the per-call timeout from `RetryingInvoker`), so a
/// disagreement between secretaries reflects the Archon's own answer being
/// unstable across calls, not a re-parse of identical text. Any invocation
/// failure defaults to `ABSTAIN` rather than propagating — voting never
/// crashes the session (§4.5 "Error conditions").
async fn cast_one_vote(invoker: Arc<dyn AgentInvoker>, archon_id: &str, motion_text: &str, three_channel: bool) -> VoteChoice {
    let Ok(id) = archon_id.parse::<u8>() else {
        return VoteChoice::Abstain;
    };
    let archon = ArchonId(id);

    let Some(primary) = invoke_vote(&invoker, archon, motion_text, "vote").await else {
        return VoteChoice::Abstain;
    };

    if !three_channel {
        return primary;
    }

    let secretary_a = invoke_vote(&invoker, archon, motion_text, "vote:secretary-a").await;
    let secretary_b = invoke_vote(&invoker, archon, motion_text, "vote:secretary-b").await;
    match (secretary_a, secretary_b) {
        (Some(a), Some(b)) if a == b => a,
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => primary,
        (Some(_), Some(_)) => {
            // Secretaries disagree: a witness casts the tiebreaking call.
            invoke_vote(&invoker, archon, motion_text, "vote:witness")
                .await
                .unwrap_or(primary)
        }
    }
}

async fn invoke_vote(invoker: &Arc<dyn AgentInvoker>, archon_id: ArchonId, motion_text: &str, round_label: &str) -> Option<VoteChoice> {
    let context = InvocationContext {
        subject_text: motion_text.to_string(),
        round_label: round_label.to_string(),
        recent_history: Vec::new(),
    };
    let response = invoker.invoke(archon_id, &context).await.ok()?;
    Some(VoteChoice::parse_response(&response.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_types::agent_invoker::MockAgentInvoker;

    #[tokio::test]
    async fn collects_one_vote_per_present_archon_unbounded() {
        let mock = MockAgentInvoker::new("AYE");
        let invoker: Arc<dyn AgentInvoker> = Arc::new(mock);
        let present = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let votes = collect_votes(invoker, &present, "motion text", 0, false).await.unwrap();
        assert_eq!(votes.len(), 3);
        assert!(votes.values().all(|v| *v == VoteChoice::Aye));
    }

    #[tokio::test]
    async fn bounded_concurrency_still_collects_all_votes() {
        let mock = MockAgentInvoker::new("NAY");
        let invoker: Arc<dyn AgentInvoker> = Arc::new(mock);
        let present: Vec<String> = (1..=9).map(|i| i.to_string()).collect();
        let votes = collect_votes(invoker, &present, "motion text", 2, false).await.unwrap();
        assert_eq!(votes.len(), 9);
    }

    #[tokio::test]
    async fn three_channel_agreement_passes_through() {
        let mock = MockAgentInvoker::new("AYE");
        let invoker: Arc<dyn AgentInvoker> = Arc::new(mock);
        let vote = cast_one_vote(invoker, "1", "motion text", true).await;
        assert_eq!(vote, VoteChoice::Aye);
    }

    #[tokio::test]
    async fn three_channel_witness_resolves_secretary_disagreement() {
        let mock = MockAgentInvoker::new("AYE");
        mock.script(ArchonId(1), "vote:secretary-a", "AYE");
        mock.script(ArchonId(1), "vote:secretary-b", "NAY");
        mock.script(ArchonId(1), "vote:witness", "NAY");
        let invoker: Arc<dyn AgentInvoker> = Arc::new(mock);
        let vote = cast_one_vote(invoker, "1", "motion text", true).await;
        assert_eq!(vote, VoteChoice::Nay);
    }
}
