// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// The full error taxonomy shared by every subsystem (§7).
///
/// Integrity errors (`ChainViolation`, `BadSignature`, `Terminated`, `Halted`)
/// are never softened into a generic variant further up the stack; callers
/// match on these directly to decide retry vs. hard-fail behavior.
#[derive(Debug, thiserror::Error)]
pub enum ArchonError {
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    #[error("system halted: {reason}")]
    Halted { reason: String },

    #[error("system terminated at sequence {sequence}")]
    Terminated { sequence: i64 },

    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("queue at capacity, retry after {0:?}")]
    QueueAtCapacity(Duration),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("hash chain violation at sequence {sequence}: expected prev_hash {expected}, got {actual}")]
    ChainViolation {
        sequence: i64,
        expected: String,
        actual: String,
    },

    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("bad witness: {0}")]
    BadWitness(String),

    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    #[error("optimistic concurrency conflict on {resource} (expected version {expected}, found {found})")]
    OptimisticConflict {
        resource: String,
        expected: i64,
        found: i64,
    },

    #[error("timeout waiting on {0}")]
    Timeout(String),

    #[error("unrecoverable after {attempts} attempts: {reason}")]
    Unrecoverable { attempts: i32, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ArchonError {
    /// Whether a caller may reasonably retry this error after backing off.
    ///
    /// Mirrors §7's propagation policy: integrity errors are never retried,
    /// `RateLimited`/`QueueAtCapacity`/`Timeout`/`OptimisticConflict` are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArchonError::RateLimited(_)
                | ArchonError::QueueAtCapacity(_)
                | ArchonError::Timeout(_)
                | ArchonError::OptimisticConflict { .. }
        )
    }
}

pub type ArchonResult<T> = Result<T, ArchonError>;
