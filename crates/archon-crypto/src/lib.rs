// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Canonical JSON, content hashing, Ed25519 signing, and the key registry
//! contract (§4.1, §4.2). Depends only on `archon-types`; every other crate
//! in the workspace depends on this one for its cryptographic primitives.

pub mod canonical_json;
pub mod hashing;
pub mod key_registry;
pub mod signing;

pub use canonical_json::canonical_json;
pub use hashing::{content_hash, hashes_equal, signable_content, HashAlgorithm, GENESIS_HASH};
pub use key_registry::{AgentKey, InMemoryKeyRegistry, KeyRegistry};
pub use signing::{verify, EncodedPublicKey, EncodedSignature, SigningIdentity};
