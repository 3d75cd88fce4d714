// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::halt_state;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = halt_state)]
pub struct HaltStateRow {
    pub id: i16,
    pub is_halted: bool,
    pub reason: Option<String>,
    pub crisis_event_id: Option<Uuid>,
    pub halted_at: Option<DateTime<Utc>>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub ceremony_id: Option<String>,
}

/// Severity of the triggering incident, carried through to the ledger
/// event payload and the `halt/trigger` API response (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A point-in-time snapshot returned by `status()` (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltSnapshot {
    pub is_halted: bool,
    pub reason: Option<String>,
    pub crisis_event_id: Option<Uuid>,
    pub halted_at: Option<DateTime<Utc>>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub ceremony_id: Option<String>,
}

impl From<HaltStateRow> for HaltSnapshot {
    fn from(row: HaltStateRow) -> Self {
        HaltSnapshot {
            is_halted: row.is_halted,
            reason: row.reason,
            crisis_event_id: row.crisis_event_id,
            halted_at: row.halted_at,
            cleared_at: row.cleared_at,
            ceremony_id: row.ceremony_id,
        }
    }
}
