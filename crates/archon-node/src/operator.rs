// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! The process's own signing identity: every system-originated ledger
//! event (halt transitions, Conclave phase transitions, deliberation
//! timeouts) needs an actor signature and a witness signature (§3.1), even
//! when no human Archon is the proximate cause. `SystemOperator` bundles a
//! freshly generated agent/witness keypair pair, registers both public
//! keys, and hands out a `SigningContext` borrowing from itself.

use archon_crypto::key_registry::KeyRegistry;
use archon_crypto::signing::SigningIdentity;
use archon_ledger::{PgKeyRegistry, SigningContext};
use archon_types::error::ArchonResult;
use archon_types::ids::AgentId;

const OPERATOR_AGENT_ID: &str = "archon-node";
const OPERATOR_WITNESS_ID: &str = "WITNESS:archon-node";

pub struct SystemOperator {
    agent_id: String,
    signing_key_id: String,
    agent_identity: SigningIdentity,
    witness_id: String,
    witness_signing_key_id: String,
    witness_identity: SigningIdentity,
}

impl SystemOperator {
    /// Generates a fresh agent/witness keypair and registers both public
    /// keys in the ledger's key registry. Run once at process start; a
    /// restart re-registers a new key rather than persisting the private
    /// key anywhere (no key-file surface, per the Non-goals around a
    /// CLI/config-file surface).
    pub async fn bootstrap(registry: &PgKeyRegistry) -> ArchonResult<Self> {
        let agent_identity = SigningIdentity::generate();
        let witness_identity = SigningIdentity::generate();

        let signing_key_id = registry
            .register(AgentId::parse(OPERATOR_AGENT_ID)?, agent_identity.public_key())
            .await?;
        let witness_signing_key_id = registry
            .register(AgentId::parse(OPERATOR_WITNESS_ID)?, witness_identity.public_key())
            .await?;

        Ok(SystemOperator {
            agent_id: OPERATOR_AGENT_ID.to_string(),
            signing_key_id,
            agent_identity,
            witness_id: OPERATOR_WITNESS_ID.to_string(),
            witness_signing_key_id,
            witness_identity,
        })
    }

    pub fn context(&self) -> SigningContext<'_> {
        SigningContext {
            agent_id: &self.agent_id,
            signing_key_id: &self.signing_key_id,
            agent_identity: &self.agent_identity,
            witness_id: &self.witness_id,
            witness_signing_key_id: &self.witness_signing_key_id,
            witness_identity: &self.witness_identity,
        }
    }
}
