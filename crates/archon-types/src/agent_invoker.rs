// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The `AgentInvoker` seam (§1 non-goal: "the language-model inference calls
//! ... are irrelevant to this design"). Both the Conclave and Three-Fates
//! orchestrators invoke one Archon at a time through this trait; the actual
//! prompting, model selection, and provider are entirely out of scope here —
//! `archon-node` wires the real implementation, and `MockAgentInvoker` below
//! is the deterministic stand-in used by every orchestrator test in the
//! workspace.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ArchonError, ArchonResult};
use crate::roster::ArchonId;

/// A bundle of context handed to an Archon ahead of one invocation:
/// the text under deliberation, a round/phase label, and recent history
/// (§4.5 step 3: "last K debate entries").
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub subject_text: String,
    pub round_label: String,
    pub recent_history: Vec<String>,
}

/// One Archon's raw response to an invocation — a debate speech or a vote
/// prompt reply, left as free text; the caller (Conclave/Three-Fates) is
/// responsible for parsing a vote out of it.
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    pub text: String,
}

/// Invokes one Archon and returns its response, or an error if the
/// invocation itself failed (timeout, provider error) — callers degrade a
/// failed invocation to `abstain`/`absent-for-round` rather than propagate
/// it as a session-ending error (§4.5 "Error conditions").
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, archon_id: ArchonId, context: &InvocationContext) -> ArchonResult<InvocationResponse>;
}

/// Wraps an `AgentInvoker` with a per-call timeout and bounded retries with
/// exponential backoff (§5: "base 1s -> cap 60s"), the way a real provider
/// call needs to be guarded even though `MockAgentInvoker` never fails.
/// Retries exhaust to the last error, which the caller still degrades to
/// `abstain`/`absent-for-round` exactly as it does for a single failed call.
pub struct RetryingInvoker<I> {
    inner: I,
    per_call_timeout: Duration,
    max_retries: u32,
}

impl<I: AgentInvoker> RetryingInvoker<I> {
    pub fn new(inner: I, per_call_timeout: Duration, max_retries: u32) -> Self {
        RetryingInvoker { inner, per_call_timeout, max_retries }
    }
}

#[async_trait]
impl<I: AgentInvoker> AgentInvoker for RetryingInvoker<I> {
    async fn invoke(&self, archon_id: ArchonId, context: &InvocationContext) -> ArchonResult<InvocationResponse> {
        let mut policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(self.per_call_timeout, self.inner.invoke(archon_id, context)).await;
            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => ArchonError::Timeout(format!(
                    "agent invocation for archon {} timed out after {:?}",
                    archon_id.get(),
                    self.per_call_timeout
                )),
            };
            if attempt >= self.max_retries {
                return Err(error);
            }
            attempt += 1;
            let delay = policy.next_backoff().unwrap_or(Duration::from_secs(60));
            tracing::warn!(
                archon_id = archon_id.get(),
                attempt,
                error = %error,
                "agent invocation failed, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// A deterministic stand-in for tests: returns a scripted response per
/// Archon, or a fixed default when none was scripted. No randomness, no
/// network I/O, no timing variance — exactly what a state-machine unit
/// test needs and nothing an LLM client would provide.
pub struct MockAgentInvoker {
    scripted: Mutex<HashMap<(ArchonId, String), String>>,
    default_response: String,
}

impl MockAgentInvoker {
    pub fn new(default_response: impl Into<String>) -> Self {
        MockAgentInvoker {
            scripted: Mutex::new(HashMap::new()),
            default_response: default_response.into(),
        }
    }

    /// Scripts the response a given Archon returns for a given round label.
    pub fn script(&self, archon_id: ArchonId, round_label: impl Into<String>, response: impl Into<String>) {
        self.scripted
            .lock()
            .expect("mock invoker mutex poisoned")
            .insert((archon_id, round_label.into()), response.into());
    }
}

#[async_trait]
impl AgentInvoker for MockAgentInvoker {
    async fn invoke(&self, archon_id: ArchonId, context: &InvocationContext) -> ArchonResult<InvocationResponse> {
        let key = (archon_id, context.round_label.clone());
        let text = self
            .scripted
            .lock()
            .expect("mock invoker mutex poisoned")
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_response.clone());
        Ok(InvocationResponse { text })
    }
}

/// A test double that fails its first `fail_count` calls, then always
/// succeeds — used to exercise `RetryingInvoker`'s retry path without a
/// real flaky provider.
#[cfg(test)]
struct FlakyInvoker {
    remaining_failures: Mutex<u32>,
}

#[cfg(test)]
#[async_trait]
impl AgentInvoker for FlakyInvoker {
    async fn invoke(&self, _archon_id: ArchonId, _context: &InvocationContext) -> ArchonResult<InvocationResponse> {
        let mut remaining = self.remaining_failures.lock().expect("mutex poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ArchonError::Storage("transient provider error".to_string()));
        }
        Ok(InvocationResponse { text: "AYE".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrying_invoker_succeeds_after_transient_failures() {
        let flaky = FlakyInvoker { remaining_failures: Mutex::new(2) };
        let invoker = RetryingInvoker::new(flaky, Duration::from_secs(5), 3);
        let ctx = InvocationContext {
            subject_text: "motion text".to_string(),
            round_label: "round-1".to_string(),
            recent_history: vec![],
        };
        let resp = invoker.invoke(ArchonId(1), &ctx).await.unwrap();
        assert_eq!(resp.text, "AYE");
    }

    #[tokio::test]
    async fn retrying_invoker_exhausts_to_last_error() {
        let flaky = FlakyInvoker { remaining_failures: Mutex::new(10) };
        let invoker = RetryingInvoker::new(flaky, Duration::from_secs(5), 1);
        let ctx = InvocationContext {
            subject_text: "motion text".to_string(),
            round_label: "round-1".to_string(),
            recent_history: vec![],
        };
        assert!(invoker.invoke(ArchonId(1), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn mock_invoker_returns_scripted_response() {
        let mock = MockAgentInvoker::new("ABSTAIN");
        mock.script(ArchonId(1), "round-1", "AYE");
        let ctx = InvocationContext {
            subject_text: "motion text".to_string(),
            round_label: "round-1".to_string(),
            recent_history: vec![],
        };
        let resp = mock.invoke(ArchonId(1), &ctx).await.unwrap();
        assert_eq!(resp.text, "AYE");
    }

    #[tokio::test]
    async fn mock_invoker_falls_back_to_default() {
        let mock = MockAgentInvoker::new("ABSTAIN");
        let ctx = InvocationContext {
            subject_text: "motion text".to_string(),
            round_label: "round-1".to_string(),
            recent_history: vec![],
        };
        let resp = mock.invoke(ArchonId(2), &ctx).await.unwrap();
        assert_eq!(resp.text, "ABSTAIN");
    }
}
