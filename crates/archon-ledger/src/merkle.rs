// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Merkle epoch builder (§4.3). Batches committed events into contiguous,
//! non-overlapping epochs and computes a binary Merkle tree over each
//! epoch's leaf hashes so that external parties can verify proof-of-
//! inclusion for a single event without replaying the whole ledger.

use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use archon_crypto::hashing::{hashes_equal, HashAlgorithm};
use archon_types::{ArchonError, ArchonResult};

use crate::models::{MerkleEpochRow, StoredEvent};
use crate::pool::PgPool;
use crate::schema::{events, merkle_epochs};
use crate::signing_context::SigningContext;
use crate::store::EventStore;

/// Frozen convention (SPEC_FULL.md §4, Open Question 3): the empty-epoch
/// root representation. An epoch builder never actually persists a
/// zero-event epoch (the `merkle_epochs_range` CHECK forbids an inverted
/// `[start, end]` range), but the literal is frozen here so any future
/// caller computing a root over zero leaves gets a stable, documented
/// answer rather than reinventing one.
pub fn empty_root_literal(algorithm: HashAlgorithm) -> String {
    format!("{}:empty", algorithm_prefix(algorithm))
}

fn algorithm_prefix(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
        HashAlgorithm::Blake3 => "blake3",
    }
}

/// A built epoch, ready to be persisted alongside its `merkle.root.published`
/// ledger event.
#[derive(Debug, Clone)]
pub struct BuiltEpoch {
    pub epoch_id: i64,
    pub start_sequence: i64,
    pub end_sequence: i64,
    pub algorithm: HashAlgorithm,
    pub root_hash: String,
    pub event_count: i64,
}

/// An authentication path entry: the sibling hash and which side it sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub sibling_hash: String,
    pub sibling_is_left: bool,
}

#[derive(Debug, Clone)]
pub struct InclusionProof {
    pub epoch_id: i64,
    pub root: String,
    pub path: Vec<PathStep>,
    pub leaf_index: usize,
}


/// Computes a binary Merkle root over `leaves` (hex content hashes),
/// duplicating the last leaf when a level has an odd count — the standard
/// Bitcoin-style convention, applied here because the pack's cryptography
/// corpus uses the same pairing rule for its own Merkle accumulators.
fn build_tree(algorithm: HashAlgorithm, leaves: &[String]) -> Vec<Vec<String>> {
    if leaves.is_empty() {
        return vec![];
    }
    let mut levels = vec![leaves.to_vec()];
    while levels.last().unwrap().len() > 1 {
        let current = levels.last().unwrap();
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        let mut i = 0;
        while i < current.len() {
            let left = &current[i];
            let right = if i + 1 < current.len() { &current[i + 1] } else { left };
            let mut combined = Vec::with_capacity(left.len() + right.len());
            combined.extend_from_slice(left.as_bytes());
            combined.extend_from_slice(right.as_bytes());
            next.push(algorithm.digest_hex(&combined));
            i += 2;
        }
        levels.push(next);
    }
    levels
}

fn tree_root(algorithm: HashAlgorithm, levels: &[Vec<String>]) -> String {
    match levels.last().and_then(|top| top.first()) {
        Some(root) => format!("{}:{}", algorithm_prefix(algorithm), root),
        None => empty_root_literal(algorithm),
    }
}

fn authentication_path(levels: &[Vec<String>], mut index: usize) -> Vec<PathStep> {
    let mut path = Vec::new();
    for level in levels.iter().take(levels.len().saturating_sub(1)) {
        let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
        let sibling_is_left = index % 2 == 1;
        let sibling = if sibling_index < level.len() {
            level[sibling_index].clone()
        } else {
            level[index].clone()
        };
        path.push(PathStep {
            sibling_hash: sibling,
            sibling_is_left,
        });
        index /= 2;
    }
    path
}

/// Verifies an authentication path against a recorded root (§4.3,
/// §8 property 12).
pub fn verify_proof(algorithm: HashAlgorithm, leaf_hash: &str, path: &[PathStep], root: &str) -> bool {
    let mut current = leaf_hash.to_string();
    for step in path {
        let mut combined = Vec::new();
        if step.sibling_is_left {
            combined.extend_from_slice(step.sibling_hash.as_bytes());
            combined.extend_from_slice(current.as_bytes());
        } else {
            combined.extend_from_slice(current.as_bytes());
            combined.extend_from_slice(step.sibling_hash.as_bytes());
        }
        current = algorithm.digest_hex(&combined);
    }
    let computed_root = format!("{}:{}", algorithm_prefix(algorithm), current);
    hashes_equal(&computed_root, root)
}

pub struct MerkleEpochBuilder<'a> {
    pool: PgPool,
    store: &'a EventStore,
    algorithm: HashAlgorithm,
}

impl<'a> MerkleEpochBuilder<'a> {
    pub fn new(pool: PgPool, store: &'a EventStore, algorithm: HashAlgorithm) -> Self {
        MerkleEpochBuilder { pool, store, algorithm }
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

    /// §4.3 `build_next_epoch`. Returns `None` (and logs) when there are no
    /// committed events past the last epoch boundary yet — an epoch is
    /// never persisted with an inverted, empty `[start, end]` range.
    pub async fn build_next_epoch(
        &self,
        max_events: i64,
        signer: &SigningContext<'_>,
    ) -> ArchonResult<Option<BuiltEpoch>> {
        let mut conn = self.conn().await?;

        let last_epoch: Option<(i64, i64)> = merkle_epochs::table
            .select((merkle_epochs::epoch_id, merkle_epochs::end_sequence))
            .order(merkle_epochs::epoch_id.desc())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| ArchonError::Storage(format!("failed to read last epoch: {e}")))?;

        let (next_epoch_id, start_sequence) = match last_epoch {
            Some((id, end)) => (id + 1, end + 1),
            None => (0, 1),
        };

        let rows: Vec<StoredEvent> = events::table
            .filter(events::sequence.ge(start_sequence))
            .order(events::sequence.asc())
            .limit(max_events)
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to load events for epoch: {e}")))?;

        if rows.is_empty() {
            tracing::info!(start_sequence, "no new events to batch into a Merkle epoch");
            return Ok(None);
        }

        let end_sequence = rows.last().unwrap().sequence;
        let leaves: Vec<String> = rows.iter().map(|r| r.content_hash.clone()).collect();
        let levels = build_tree(self.algorithm, &leaves);
        let root_hash = tree_root(self.algorithm, &levels);

        let root_event_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "epoch_id": next_epoch_id,
            "start_sequence": start_sequence,
            "end_sequence": end_sequence,
            "root_hash": root_hash,
            "event_count": rows.len(),
        });

        self.store
            .sign_and_append(root_event_id, "merkle.root.published", "1.0.0", payload, signer, false)
            .await?;

        diesel::insert_into(merkle_epochs::table)
            .values(MerkleEpochRow {
                epoch_id: next_epoch_id,
                start_sequence,
                end_sequence,
                algorithm: algorithm_prefix(self.algorithm).to_string(),
                root_hash: root_hash.clone(),
                event_count: rows.len() as i64,
                root_event_id,
            })
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to persist epoch: {e}")))?;

        Ok(Some(BuiltEpoch {
            epoch_id: next_epoch_id,
            start_sequence,
            end_sequence,
            algorithm: self.algorithm,
            root_hash,
            event_count: rows.len() as i64,
        }))
    }

    /// §4.3 `proof_of_inclusion`.
    pub async fn proof_of_inclusion(&self, event_id: Uuid) -> ArchonResult<InclusionProof> {
        let mut conn = self.conn().await?;
        let event: StoredEvent = events::table
            .filter(events::event_id.eq(event_id))
            .first(&mut conn)
            .await
            .map_err(|_| ArchonError::NotFound(format!("event {event_id}")))?;

        let epoch: (i64, i64, i64, String, String) = merkle_epochs::table
            .select((
                merkle_epochs::epoch_id,
                merkle_epochs::start_sequence,
                merkle_epochs::end_sequence,
                merkle_epochs::algorithm,
                merkle_epochs::root_hash,
            ))
            .filter(merkle_epochs::start_sequence.le(event.sequence))
            .filter(merkle_epochs::end_sequence.ge(event.sequence))
            .first(&mut conn)
            .await
            .map_err(|_| ArchonError::NotFound(format!("epoch covering sequence {}", event.sequence)))?;

        let (epoch_id, start_sequence, end_sequence, _algo, root) = epoch;

        let rows: Vec<StoredEvent> = events::table
            .filter(events::sequence.ge(start_sequence))
            .filter(events::sequence.le(end_sequence))
            .order(events::sequence.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to reload epoch leaves: {e}")))?;

        let leaves: Vec<String> = rows.iter().map(|r| r.content_hash.clone()).collect();
        let leaf_index = (event.sequence - start_sequence) as usize;
        let levels = build_tree(self.algorithm, &leaves);
        let path = authentication_path(&levels, leaf_index);

        Ok(InclusionProof {
            epoch_id,
            root,
            path,
            leaf_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> String {
        format!("{n:064x}")
    }

    #[test]
    fn single_leaf_root_equals_leaf_prefixed() {
        let leaves = vec![leaf(1)];
        let levels = build_tree(HashAlgorithm::Sha256, &leaves);
        assert_eq!(tree_root(HashAlgorithm::Sha256, &levels), format!("sha256:{}", leaf(1)));
    }

    #[test]
    fn proof_round_trips_for_even_leaf_count() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        let levels = build_tree(HashAlgorithm::Blake3, &leaves);
        let root = tree_root(HashAlgorithm::Blake3, &levels);
        for (i, l) in leaves.iter().enumerate() {
            let path = authentication_path(&levels, i);
            assert!(verify_proof(HashAlgorithm::Blake3, l, &path, &root), "leaf {i} failed to verify");
        }
    }

    #[test]
    fn proof_round_trips_for_odd_leaf_count_with_duplication() {
        let leaves = vec![leaf(1), leaf(2), leaf(3)];
        let levels = build_tree(HashAlgorithm::Blake3, &leaves);
        let root = tree_root(HashAlgorithm::Blake3, &levels);
        for (i, l) in leaves.iter().enumerate() {
            let path = authentication_path(&levels, i);
            assert!(verify_proof(HashAlgorithm::Blake3, l, &path, &root));
        }
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let leaves = vec![leaf(1), leaf(2)];
        let levels = build_tree(HashAlgorithm::Sha256, &leaves);
        let root = tree_root(HashAlgorithm::Sha256, &levels);
        let path = authentication_path(&levels, 0);
        assert!(!verify_proof(HashAlgorithm::Sha256, &leaf(9), &path, &root));
    }

    #[test]
    fn empty_root_literal_is_frozen() {
        assert_eq!(empty_root_literal(HashAlgorithm::Blake3), "blake3:empty");
        assert_eq!(empty_root_literal(HashAlgorithm::Sha256), "sha256:empty");
    }
}
