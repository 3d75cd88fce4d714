// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared error taxonomy and domain newtypes used by every Archon 72 crate.
//! No inter-project dependencies beyond `serde`/`chrono`/`uuid`/`thiserror` —
//! every other crate in the workspace depends on this one.

pub mod agent_invoker;
pub mod branch;
pub mod error;
pub mod halt_whitelist;
pub mod ids;
pub mod rank;
pub mod roster;
pub mod schema_version;

pub use agent_invoker::{AgentInvoker, InvocationContext, InvocationResponse, MockAgentInvoker};
pub use branch::{Branch, EventType};
pub use error::{ArchonError, ArchonResult};
pub use halt_whitelist::{is_halt_whitelisted, HALT_WHITELIST};
pub use ids::{AgentId, EventId, WitnessId};
pub use rank::Rank;
pub use roster::{ArchonId, ArchonProfile, ROSTER};
pub use schema_version::SchemaVersion;
