// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use unicode_normalization::UnicodeNormalization;

use crate::canonical_json::canonical_json;
use archon_types::{ArchonError, EventType};

/// The all-zero genesis `prev_hash` for the very first ledger event (§4.1.2).
/// 64 hex zeros — the width of a SHA-256 digest, frozen regardless of which
/// `hash_alg_version` produced subsequent links.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const _ASSERT_GENESIS_HASH_WIDTH: () = assert!(GENESIS_HASH.len() == 64);

/// Algorithm selector for `hash_alg_version` (§3.1, §4.1.1). `1` is the
/// default (SHA-256); `2` admits BLAKE3 under algorithm rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn from_version(version: i16) -> Result<Self, ArchonError> {
        match version {
            1 => Ok(HashAlgorithm::Sha256),
            2 => Ok(HashAlgorithm::Blake3),
            other => Err(ArchonError::SchemaInvalid(format!(
                "unknown hash_alg_version {other}"
            ))),
        }
    }

    pub fn version(&self) -> i16 {
        match self {
            HashAlgorithm::Sha256 => 1,
            HashAlgorithm::Blake3 => 2,
        }
    }

    pub fn digest_hex(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(bytes);
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        }
    }
}

/// Builds `signable_content = event_type | canonical_json(payload) | prev_hash`
/// (§4.1.1). The pipe is a literal byte, not escaped, matching the spec's
/// delimiter.
pub fn signable_content(event_type: &EventType, payload: &serde_json::Value, prev_hash: &str) -> Vec<u8> {
    let normalized_event_type: String = event_type.as_str().nfkc().collect();
    let canonical_payload = canonical_json(payload);
    let mut out = Vec::with_capacity(
        normalized_event_type.len() + canonical_payload.len() + prev_hash.len() + 2,
    );
    out.extend_from_slice(normalized_event_type.as_bytes());
    out.push(b'|');
    out.extend_from_slice(canonical_payload.as_bytes());
    out.push(b'|');
    out.extend_from_slice(prev_hash.as_bytes());
    out
}

/// `content_hash = hex(HASH(signable_content))` (§4.1.1).
pub fn content_hash(
    algorithm: HashAlgorithm,
    event_type: &EventType,
    payload: &serde_json::Value,
    prev_hash: &str,
) -> String {
    algorithm.digest_hex(&signable_content(event_type, payload, prev_hash))
}

/// Constant-time hash equality (§4.1.4) — never compare digests with `==`.
pub fn hashes_equal(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_types::EventType;
    use serde_json::json;

    #[test]
    fn genesis_hash_is_all_zeros_and_64_hex_chars() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn sha256_digest_is_deterministic() {
        let et = EventType::parse("executive.task.accepted").unwrap();
        let payload = json!({"a": 1});
        let h1 = content_hash(HashAlgorithm::Sha256, &et, &payload, GENESIS_HASH);
        let h2 = content_hash(HashAlgorithm::Sha256, &et, &payload, GENESIS_HASH);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn different_prev_hash_changes_digest() {
        let et = EventType::parse("executive.task.accepted").unwrap();
        let payload = json!({"a": 1});
        let h1 = content_hash(HashAlgorithm::Sha256, &et, &payload, GENESIS_HASH);
        let h2 = content_hash(HashAlgorithm::Sha256, &et, &payload, &h1);
        assert_ne!(h1, h2);
    }

    #[test]
    fn constant_time_compare_matches_naive_equality() {
        assert!(hashes_equal("abc123", "abc123"));
        assert!(!hashes_equal("abc123", "abc124"));
        assert!(!hashes_equal("abc123", "abc12"));
    }
}
