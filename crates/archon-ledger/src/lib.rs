// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The append-only, hash-chained, witnessed event ledger (§3.1, §4.1) and
//! its companion Merkle epoch builder (§3.3, §4.3), backed by a single
//! authoritative Postgres database. Every write-capable component in the
//! workspace depends on this crate; nothing downstream of it may bypass
//! `EventStore::append`.

pub mod key_registry;
pub mod merkle;
pub mod models;
pub mod pool;
pub mod schema;
pub mod signing_context;
pub mod store;

pub use key_registry::PgKeyRegistry;
pub use merkle::{empty_root_literal, verify_proof, BuiltEpoch, InclusionProof, MerkleEpochBuilder, PathStep};
pub use pool::{connect, run_migrations, PgPool};
pub use signing_context::SigningContext;
pub use store::{AppendRequest, ChainVerification, EventStore};
