// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! A reusable bundle of the agent + witness signing material every ledger
//! write needs (§3.1: every event carries both an actor signature and a
//! witness signature). Shared by `archon-halt`, `archon-motions`,
//! `archon-fates`, and `archon-conclave` so each doesn't reinvent the
//! sign-then-append sequence.

use archon_crypto::signing::SigningIdentity;

pub struct SigningContext<'a> {
    pub agent_id: &'a str,
    pub signing_key_id: &'a str,
    pub agent_identity: &'a SigningIdentity,
    pub witness_id: &'a str,
    pub witness_signing_key_id: &'a str,
    pub witness_identity: &'a SigningIdentity,
}
