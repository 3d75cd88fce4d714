// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed configuration (§6). Loaded from the environment with `envy`, the
//! way the teacher's `ecosystem/indexer` service loads its Postgres/indexer
//! settings, and validated eagerly at process start rather than lazily at
//! first use.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration from the environment: {0}")]
    Load(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Deserialized directly from `ARCHON_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    database_url: String,

    #[serde(default = "default_debate_rounds")]
    debate_rounds: u32,
    #[serde(default = "default_voting_concurrency")]
    voting_concurrency: u32,
    #[serde(default = "default_supermajority_numerator")]
    supermajority_threshold_numerator: u32,
    #[serde(default = "default_supermajority_denominator")]
    supermajority_threshold_denominator: u32,
    #[serde(default = "default_consensus_break_threshold")]
    consensus_break_threshold: f64,
    #[serde(default = "default_red_team_count")]
    red_team_count: u32,
    #[serde(default = "default_max_deliberation_rounds")]
    max_deliberation_rounds: u32,
    #[serde(default = "default_deliberation_timeout_secs")]
    deliberation_timeout_secs: u64,
    #[serde(default = "default_referral_deadline_cycles")]
    referral_deadline_cycles: u32,
    #[serde(default = "default_referral_deadline_max_extensions")]
    referral_deadline_max_extensions: u32,
    #[serde(default = "default_clock_drift_threshold_seconds")]
    clock_drift_threshold_seconds: u64,
    #[serde(default = "default_rate_limit_per_hour_per_submitter")]
    rate_limit_per_hour_per_submitter: u32,
    #[serde(default = "default_cosign_rate_limit_per_hour_per_signer")]
    cosign_rate_limit_per_hour_per_signer: u32,
    #[serde(default = "default_job_max_attempts")]
    job_max_attempts: i32,
    #[serde(default = "default_poll_batch_size")]
    poll_batch_size: i32,
    #[serde(default)]
    three_channel_vote_validation: bool,
    #[serde(default = "default_agent_invocation_timeout_secs")]
    agent_invocation_timeout_secs: u64,
    #[serde(default = "default_agent_invocation_max_retries")]
    agent_invocation_max_retries: u32,

    #[serde(default = "default_escalation_general")]
    escalation_threshold_general: u32,
    #[serde(default = "default_escalation_cessation")]
    escalation_threshold_cessation: u32,
    #[serde(default = "default_escalation_grievance")]
    escalation_threshold_grievance: u32,
    #[serde(default = "default_escalation_collaboration")]
    escalation_threshold_collaboration: u32,
    #[serde(default = "default_escalation_meta")]
    escalation_threshold_meta: u32,
}

fn default_debate_rounds() -> u32 {
    3
}
fn default_voting_concurrency() -> u32 {
    1
}
fn default_supermajority_numerator() -> u32 {
    2
}
fn default_supermajority_denominator() -> u32 {
    3
}
fn default_consensus_break_threshold() -> f64 {
    0.85
}
fn default_red_team_count() -> u32 {
    5
}
fn default_max_deliberation_rounds() -> u32 {
    3
}
fn default_deliberation_timeout_secs() -> u64 {
    300
}
fn default_referral_deadline_cycles() -> u32 {
    3
}
fn default_referral_deadline_max_extensions() -> u32 {
    2
}
fn default_clock_drift_threshold_seconds() -> u64 {
    5
}
fn default_rate_limit_per_hour_per_submitter() -> u32 {
    10
}
fn default_cosign_rate_limit_per_hour_per_signer() -> u32 {
    50
}
fn default_job_max_attempts() -> i32 {
    3
}
fn default_poll_batch_size() -> i32 {
    50
}
fn default_agent_invocation_timeout_secs() -> u64 {
    30
}
fn default_agent_invocation_max_retries() -> u32 {
    3
}
fn default_escalation_general() -> u32 {
    100
}
fn default_escalation_cessation() -> u32 {
    25
}
fn default_escalation_grievance() -> u32 {
    50
}
fn default_escalation_collaboration() -> u32 {
    75
}
fn default_escalation_meta() -> u32 {
    100
}

/// Petition type, used to look up an escalation co-signer threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PetitionType {
    General,
    Cessation,
    Grievance,
    Collaboration,
    Meta,
}

/// Fully validated runtime configuration (§6).
#[derive(Debug, Clone)]
pub struct ArchonConfig {
    pub database_url: String,
    pub debate_rounds: u32,
    pub voting_concurrency: u32,
    pub supermajority_threshold_numerator: u32,
    pub supermajority_threshold_denominator: u32,
    pub consensus_break_threshold: f64,
    pub red_team_count: u32,
    pub max_deliberation_rounds: u32,
    pub deliberation_timeout: Duration,
    pub referral_deadline_cycles: u32,
    pub referral_deadline_max_extensions: u32,
    pub clock_drift_threshold: Duration,
    pub rate_limit_per_hour_per_submitter: u32,
    pub cosign_rate_limit_per_hour_per_signer: u32,
    pub job_max_attempts: i32,
    pub poll_batch_size: i32,
    /// Gates the three-independent-invocation vote validation path (§4.5
    /// step 4, "optional, config-gated").
    pub three_channel_vote_validation: bool,
    /// Per-call timeout and bounded-retry count at the `AgentInvoker` seam
    /// (§5: "per-call timeouts and bounded retries with exponential
    /// backoff"). The backoff base/cap themselves are fixed at 1s/60s, not
    /// configurable.
    pub agent_invocation_timeout: Duration,
    pub agent_invocation_max_retries: u32,
    escalation_thresholds: HashMap<&'static str, u32>,
    /// Clearing a halt always requires an operator ceremony id (§4.4). This
    /// is architectural, not a toggle; it is not read from the environment.
    pub halt_ceremony_required: bool,
}

impl ArchonConfig {
    /// Loads configuration from `ARCHON_*` environment variables and
    /// validates it eagerly; returns a descriptive error rather than
    /// silently clamping an out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawConfig = envy::prefixed("ARCHON_").from_env()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.supermajority_threshold_numerator == 0
            || raw.supermajority_threshold_denominator == 0
            || raw.supermajority_threshold_numerator > raw.supermajority_threshold_denominator
        {
            return Err(ConfigError::Invalid(format!(
                "supermajority threshold {}/{} must be in (0, 1]",
                raw.supermajority_threshold_numerator, raw.supermajority_threshold_denominator
            )));
        }
        if !(0.0..=1.0).contains(&raw.consensus_break_threshold) {
            return Err(ConfigError::Invalid(format!(
                "consensus_break_threshold {} must be in [0, 1]",
                raw.consensus_break_threshold
            )));
        }
        if raw.max_deliberation_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_deliberation_rounds must be at least 1".to_string(),
            ));
        }
        if raw.job_max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "job_max_attempts must be at least 1".to_string(),
            ));
        }
        if raw.poll_batch_size < 1 {
            return Err(ConfigError::Invalid(
                "poll_batch_size must be at least 1".to_string(),
            ));
        }
        if raw.agent_invocation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent_invocation_timeout_secs must be at least 1".to_string(),
            ));
        }

        let mut escalation_thresholds = HashMap::new();
        escalation_thresholds.insert("general", raw.escalation_threshold_general);
        escalation_thresholds.insert("cessation", raw.escalation_threshold_cessation);
        escalation_thresholds.insert("grievance", raw.escalation_threshold_grievance);
        escalation_thresholds.insert("collaboration", raw.escalation_threshold_collaboration);
        escalation_thresholds.insert("meta", raw.escalation_threshold_meta);

        Ok(ArchonConfig {
            database_url: raw.database_url,
            debate_rounds: raw.debate_rounds,
            voting_concurrency: raw.voting_concurrency,
            supermajority_threshold_numerator: raw.supermajority_threshold_numerator,
            supermajority_threshold_denominator: raw.supermajority_threshold_denominator,
            consensus_break_threshold: raw.consensus_break_threshold,
            red_team_count: raw.red_team_count,
            max_deliberation_rounds: raw.max_deliberation_rounds,
            deliberation_timeout: Duration::from_secs(raw.deliberation_timeout_secs),
            referral_deadline_cycles: raw.referral_deadline_cycles,
            referral_deadline_max_extensions: raw.referral_deadline_max_extensions,
            clock_drift_threshold: Duration::from_secs(raw.clock_drift_threshold_seconds),
            rate_limit_per_hour_per_submitter: raw.rate_limit_per_hour_per_submitter,
            cosign_rate_limit_per_hour_per_signer: raw.cosign_rate_limit_per_hour_per_signer,
            job_max_attempts: raw.job_max_attempts,
            poll_batch_size: raw.poll_batch_size,
            three_channel_vote_validation: raw.three_channel_vote_validation,
            agent_invocation_timeout: Duration::from_secs(raw.agent_invocation_timeout_secs),
            agent_invocation_max_retries: raw.agent_invocation_max_retries,
            escalation_thresholds,
            halt_ceremony_required: true,
        })
    }

    pub fn escalation_threshold(&self, petition_type: PetitionType) -> u32 {
        let key = match petition_type {
            PetitionType::General => "general",
            PetitionType::Cessation => "cessation",
            PetitionType::Grievance => "grievance",
            PetitionType::Collaboration => "collaboration",
            PetitionType::Meta => "meta",
        };
        self.escalation_thresholds[key]
    }

    /// Whether voting concurrency is unbounded (§4.5 step 4: "0 = unlimited").
    pub fn voting_is_unbounded(&self) -> bool {
        self.voting_concurrency == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawConfig {
        RawConfig {
            database_url: "postgres://localhost/archon72".to_string(),
            debate_rounds: default_debate_rounds(),
            voting_concurrency: default_voting_concurrency(),
            supermajority_threshold_numerator: default_supermajority_numerator(),
            supermajority_threshold_denominator: default_supermajority_denominator(),
            consensus_break_threshold: default_consensus_break_threshold(),
            red_team_count: default_red_team_count(),
            max_deliberation_rounds: default_max_deliberation_rounds(),
            deliberation_timeout_secs: default_deliberation_timeout_secs(),
            referral_deadline_cycles: default_referral_deadline_cycles(),
            referral_deadline_max_extensions: default_referral_deadline_max_extensions(),
            clock_drift_threshold_seconds: default_clock_drift_threshold_seconds(),
            rate_limit_per_hour_per_submitter: default_rate_limit_per_hour_per_submitter(),
            cosign_rate_limit_per_hour_per_signer: default_cosign_rate_limit_per_hour_per_signer(),
            job_max_attempts: default_job_max_attempts(),
            poll_batch_size: default_poll_batch_size(),
            three_channel_vote_validation: false,
            agent_invocation_timeout_secs: default_agent_invocation_timeout_secs(),
            agent_invocation_max_retries: default_agent_invocation_max_retries(),
            escalation_threshold_general: default_escalation_general(),
            escalation_threshold_cessation: default_escalation_cessation(),
            escalation_threshold_grievance: default_escalation_grievance(),
            escalation_threshold_collaboration: default_escalation_collaboration(),
            escalation_threshold_meta: default_escalation_meta(),
        }
    }

    #[test]
    fn defaults_preserve_the_2_3_supermajority() {
        let cfg = ArchonConfig::from_raw(minimal_raw()).unwrap();
        assert_eq!(cfg.supermajority_threshold_numerator, 2);
        assert_eq!(cfg.supermajority_threshold_denominator, 3);
    }

    #[test]
    fn rejects_zero_denominator() {
        let mut raw = minimal_raw();
        raw.supermajority_threshold_denominator = 0;
        assert!(ArchonConfig::from_raw(raw).is_err());
    }

    #[test]
    fn rejects_numerator_over_denominator() {
        let mut raw = minimal_raw();
        raw.supermajority_threshold_numerator = 5;
        raw.supermajority_threshold_denominator = 3;
        assert!(ArchonConfig::from_raw(raw).is_err());
    }

    #[test]
    fn escalation_thresholds_are_looked_up_per_petition_type() {
        let cfg = ArchonConfig::from_raw(minimal_raw()).unwrap();
        assert_eq!(cfg.escalation_threshold(PetitionType::Cessation), 25);
        assert_eq!(cfg.escalation_threshold(PetitionType::General), 100);
    }

    #[test]
    fn voting_concurrency_zero_means_unbounded() {
        let mut raw = minimal_raw();
        raw.voting_concurrency = 0;
        let cfg = ArchonConfig::from_raw(raw).unwrap();
        assert!(cfg.voting_is_unbounded());
    }
}
