// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use archon_types::{AgentId, ArchonError};

use crate::signing::EncodedPublicKey;

/// A registered agent signing key (§3.2). Keys are retired, never deleted.
#[derive(Debug, Clone)]
pub struct AgentKey {
    pub key_id: String,
    pub agent_id: AgentId,
    pub public_key: EncodedPublicKey,
    pub active_from: DateTime<Utc>,
    pub active_until: Option<DateTime<Utc>>,
}

impl AgentKey {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        at >= self.active_from && self.active_until.map(|until| at < until).unwrap_or(true)
    }
}

/// The key registry contract (§4.2). The ledger append path calls `lookup`
/// to resolve a `signing_key_id` and check the validity window against
/// `authority_timestamp`; no implementation may expose a delete operation.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    async fn register(&self, agent_id: AgentId, public_key: EncodedPublicKey) -> Result<String, ArchonError>;
    async fn lookup(&self, key_id: &str) -> Result<AgentKey, ArchonError>;
    async fn retire(&self, key_id: &str, at: DateTime<Utc>) -> Result<(), ArchonError>;
}

/// In-memory key registry for tests and for composing other in-memory
/// fixtures; the production path lives in `archon-ledger` backed by
/// Postgres, where DELETE is refused at the database-role level.
#[derive(Default)]
pub struct InMemoryKeyRegistry {
    keys: Mutex<HashMap<String, AgentKey>>,
    next_id: Mutex<u64>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyRegistry for InMemoryKeyRegistry {
    async fn register(&self, agent_id: AgentId, public_key: EncodedPublicKey) -> Result<String, ArchonError> {
        let mut next_id = self.next_id.lock().expect("lock poisoned");
        *next_id += 1;
        let key_id = format!("key-{}", *next_id);
        self.keys.lock().expect("lock poisoned").insert(
            key_id.clone(),
            AgentKey {
                key_id: key_id.clone(),
                agent_id,
                public_key,
                active_from: Utc::now(),
                active_until: None,
            },
        );
        Ok(key_id)
    }

    async fn lookup(&self, key_id: &str) -> Result<AgentKey, ArchonError> {
        self.keys
            .lock()
            .expect("lock poisoned")
            .get(key_id)
            .cloned()
            .ok_or_else(|| ArchonError::UnknownKey(key_id.to_string()))
    }

    async fn retire(&self, key_id: &str, at: DateTime<Utc>) -> Result<(), ArchonError> {
        let mut keys = self.keys.lock().expect("lock poisoned");
        let key = keys
            .get_mut(key_id)
            .ok_or_else(|| ArchonError::UnknownKey(key_id.to_string()))?;
        key.active_until = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningIdentity;

    #[tokio::test]
    async fn register_then_lookup_round_trips() {
        let registry = InMemoryKeyRegistry::new();
        let identity = SigningIdentity::generate();
        let agent = AgentId::parse("archon-07").unwrap();
        let key_id = registry
            .register(agent.clone(), identity.public_key())
            .await
            .unwrap();
        let looked_up = registry.lookup(&key_id).await.unwrap();
        assert_eq!(looked_up.agent_id, agent);
        assert!(looked_up.active_until.is_none());
    }

    #[tokio::test]
    async fn retire_sets_active_until_but_key_remains_lookupable() {
        let registry = InMemoryKeyRegistry::new();
        let identity = SigningIdentity::generate();
        let agent = AgentId::parse("archon-07").unwrap();
        let key_id = registry.register(agent, identity.public_key()).await.unwrap();
        registry.retire(&key_id, Utc::now()).await.unwrap();
        let looked_up = registry.lookup(&key_id).await.unwrap();
        assert!(looked_up.active_until.is_some());
    }
}
