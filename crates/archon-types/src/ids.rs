// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ArchonError;

/// Opaque 128-bit, caller-assigned event identifier (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `WITNESS:<name>` attribution on every event (§3.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WitnessId(String);

impl WitnessId {
    pub fn parse(raw: &str) -> Result<Self, ArchonError> {
        let Some(name) = raw.strip_prefix("WITNESS:") else {
            return Err(ArchonError::BadWitness(format!(
                "witness_id '{raw}' must have the form WITNESS:<name>"
            )));
        };
        if name.is_empty() {
            return Err(ArchonError::BadWitness(
                "witness_id name component must not be empty".to_string(),
            ));
        }
        Ok(WitnessId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WitnessId {
    type Error = ArchonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WitnessId::parse(&value)
    }
}

impl From<WitnessId> for String {
    fn from(value: WitnessId) -> Self {
        value.0
    }
}

/// Free-form actor attribution: an Archon id, an operator id, or a bridge
/// system identity (e.g. `"bridge:secretary"`). Kept as a validated
/// non-empty string rather than a closed enum since §4.5 explicitly allows
/// external/bridge-injected proposers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    pub fn parse(raw: &str) -> Result<Self, ArchonError> {
        if raw.trim().is_empty() {
            return Err(ArchonError::SchemaInvalid(
                "agent_id must not be empty".to_string(),
            ));
        }
        Ok(AgentId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentId {
    type Error = ArchonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AgentId::parse(&value)
    }
}

impl From<AgentId> for String {
    fn from(value: AgentId) -> Self {
        value.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
