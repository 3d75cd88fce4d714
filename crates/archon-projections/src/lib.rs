// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! CQRS-style projection framework (§3.10, §4.8): derived, independently
//! rebuildable read models over the ledger, applied idempotently and
//! checkpointed so a crash mid-apply never double-applies an event.

mod actor_registry;
mod engine;
mod framework;
mod legitimacy_states;
mod panel_registry;
mod petition_index;
mod schema;
mod task_states;

pub use actor_registry::ActorRegistryProjection;
pub use engine::ProjectionEngine;
pub use framework::Projection;
pub use legitimacy_states::LegitimacyStatesProjection;
pub use panel_registry::PanelRegistryProjection;
pub use petition_index::PetitionIndexProjection;
pub use task_states::TaskStatesProjection;

use std::sync::Arc;

/// Registers the full standard set of projections (§3.10) on an engine.
pub fn register_all(engine: &mut ProjectionEngine) {
    engine.register(Arc::new(TaskStatesProjection));
    engine.register(Arc::new(LegitimacyStatesProjection));
    engine.register(Arc::new(PanelRegistryProjection));
    engine.register(Arc::new(PetitionIndexProjection));
    engine.register(Arc::new(ActorRegistryProjection));
}
