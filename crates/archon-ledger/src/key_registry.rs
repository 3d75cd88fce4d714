// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Postgres-backed `KeyRegistry` (§4.2). DELETE is refused at the database
//! level (see `agent_keys_forbid_delete` trigger in the init migration);
//! this type never exposes a delete method either.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel_async::RunQueryDsl;

use archon_crypto::key_registry::{AgentKey as CryptoAgentKey, KeyRegistry};
use archon_crypto::signing::EncodedPublicKey;
use archon_types::{AgentId, ArchonError};

use crate::models::{NewAgentKey, StoredAgentKey};
use crate::pool::PgPool;
use crate::schema::agent_keys;

/// `archon_crypto::KeyRegistry` backed by `ledger.agent_keys`.
pub struct PgKeyRegistry {
    pool: PgPool,
}

impl PgKeyRegistry {
    pub fn new(pool: PgPool) -> Self {
        PgKeyRegistry { pool }
    }

    async fn conn(&self) -> Result<diesel_async::pooled_connection::bb8::PooledConnection<'_, diesel_async::AsyncPgConnection>, ArchonError> {
        self.pool
            .get()
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to acquire connection: {e}")))
    }
}

fn row_to_agent_key(row: StoredAgentKey) -> Result<CryptoAgentKey, ArchonError> {
    let mut bytes = [0u8; 32];
    if row.public_key.len() != 32 {
        return Err(ArchonError::UnknownKey(format!(
            "stored public key for {} has unexpected length {}",
            row.key_id,
            row.public_key.len()
        )));
    }
    bytes.copy_from_slice(&row.public_key);
    Ok(CryptoAgentKey {
        key_id: row.key_id,
        agent_id: AgentId::parse(&row.agent_id)?,
        public_key: EncodedPublicKey(bytes),
        active_from: row.active_from,
        active_until: row.active_until,
    })
}

#[async_trait]
impl KeyRegistry for PgKeyRegistry {
    async fn register(&self, agent_id: AgentId, public_key: EncodedPublicKey) -> Result<String, ArchonError> {
        let key_id = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn().await?;
        diesel::insert_into(agent_keys::table)
            .values(NewAgentKey {
                key_id: key_id.clone(),
                agent_id: agent_id.as_str().to_string(),
                public_key: public_key.0.to_vec(),
                active_from: Utc::now(),
                active_until: None,
            })
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to register key: {e}")))?;
        Ok(key_id)
    }

    async fn lookup(&self, key_id: &str) -> Result<CryptoAgentKey, ArchonError> {
        use diesel::QueryDsl;

        let mut conn = self.conn().await?;
        let row: StoredAgentKey = agent_keys::table
            .find(key_id.to_string())
            .first(&mut conn)
            .await
            .map_err(|_| ArchonError::UnknownKey(key_id.to_string()))?;
        row_to_agent_key(row)
    }

    async fn retire(&self, key_id: &str, at: DateTime<Utc>) -> Result<(), ArchonError> {
        use diesel::{ExpressionMethods, QueryDsl};

        let mut conn = self.conn().await?;
        let updated = diesel::update(agent_keys::table.find(key_id.to_string()))
            .set(agent_keys::active_until.eq(Some(at)))
            .execute(&mut conn)
            .await
            .map_err(|e| ArchonError::Storage(format!("failed to retire key: {e}")))?;
        if updated == 0 {
            return Err(ArchonError::UnknownKey(key_id.to_string()));
        }
        Ok(())
    }
}
