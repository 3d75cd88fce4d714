// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ArchonError;

/// Top-level governance category. The first segment of every `event_type`
/// (§3.1) and the home category of every Archon (glossary: "Branch").
///
/// §3.1 enumerates 11 branches, but §6's own wire examples use
/// `system.halt.triggered` and `cessation.final.recorded` — two event types
/// whose first segment isn't in that list. Rather than reject the spec's
/// own examples, `System` and `Cessation` are carried as two additional
/// branches alongside the 11 (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Legislative,
    Executive,
    AdministrativeSenior,
    AdministrativeStrategic,
    Judicial,
    Advisory,
    Witness,
    Petition,
    Merkle,
    Actor,
    Legitimacy,
    System,
    Cessation,
}

impl Branch {
    pub const ALL: [Branch; 13] = [
        Branch::Legislative,
        Branch::Executive,
        Branch::AdministrativeSenior,
        Branch::AdministrativeStrategic,
        Branch::Judicial,
        Branch::Advisory,
        Branch::Witness,
        Branch::Petition,
        Branch::Merkle,
        Branch::Actor,
        Branch::Legitimacy,
        Branch::System,
        Branch::Cessation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Legislative => "legislative",
            Branch::Executive => "executive",
            Branch::AdministrativeSenior => "administrative_senior",
            Branch::AdministrativeStrategic => "administrative_strategic",
            Branch::Judicial => "judicial",
            Branch::Advisory => "advisory",
            Branch::Witness => "witness",
            Branch::Petition => "petition",
            Branch::Merkle => "merkle",
            Branch::Actor => "actor",
            Branch::Legitimacy => "legitimacy",
            Branch::System => "system",
            Branch::Cessation => "cessation",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = ArchonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legislative" => Ok(Branch::Legislative),
            "executive" => Ok(Branch::Executive),
            "administrative_senior" => Ok(Branch::AdministrativeSenior),
            "administrative_strategic" => Ok(Branch::AdministrativeStrategic),
            "judicial" => Ok(Branch::Judicial),
            "advisory" => Ok(Branch::Advisory),
            "witness" => Ok(Branch::Witness),
            "petition" => Ok(Branch::Petition),
            "merkle" => Ok(Branch::Merkle),
            "actor" => Ok(Branch::Actor),
            "legitimacy" => Ok(Branch::Legitimacy),
            "system" => Ok(Branch::System),
            "cessation" => Ok(Branch::Cessation),
            other => Err(ArchonError::SchemaInvalid(format!(
                "unknown branch segment: {other}"
            ))),
        }
    }
}

/// A validated `branch.noun.verb` event type (§3.1, §4.1 step 3).
///
/// `branch` is always derived from the first segment server-side; it is
/// never accepted as a separately-supplied, independently-trusted field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    pub fn parse(raw: &str) -> Result<Self, ArchonError> {
        if !is_valid_event_type_syntax(raw) {
            return Err(ArchonError::SchemaInvalid(format!(
                "event_type '{raw}' does not match ^[a-z]+\\.[a-z]+\\.[a-z_]+$"
            )));
        }
        // Validate that the first segment is a recognized branch.
        let branch_segment = raw.split('.').next().unwrap();
        branch_segment.parse::<Branch>()?;
        Ok(EventType(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the branch server-side. Never trust a caller-supplied branch.
    pub fn branch(&self) -> Branch {
        self.0
            .split('.')
            .next()
            .unwrap()
            .parse()
            .expect("validated at construction")
    }
}

impl TryFrom<String> for EventType {
    type Error = ArchonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EventType::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_event_type_syntax(raw: &str) -> bool {
    let mut parts = raw.split('.');
    let branch = parts.next();
    let noun = parts.next();
    let verb = parts.next();
    let trailing = parts.next();

    let non_empty_lower = |s: &str, allow_underscore: bool| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || (allow_underscore && c == '_'))
    };

    match (branch, noun, verb, trailing) {
        (Some(b), Some(n), Some(v), None) => {
            non_empty_lower(b, false) && non_empty_lower(n, false) && non_empty_lower(v, true)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_event_types() {
        assert!(EventType::parse("executive.task.accepted").is_ok());
        assert!(EventType::parse("petition.received.committed").is_ok());
        assert!(EventType::parse("merkle.root.published").is_ok());
    }

    #[test]
    fn rejects_malformed_syntax() {
        assert!(EventType::parse("Executive.Task.Accepted").is_err());
        assert!(EventType::parse("executive.task").is_err());
        assert!(EventType::parse("executive..accepted").is_err());
        assert!(EventType::parse("unknownbranch.task.accepted").is_err());
    }

    #[test]
    fn branch_is_derived_not_trusted() {
        let et = EventType::parse("judicial.petition.escalated").unwrap();
        assert_eq!(et.branch(), Branch::Judicial);
    }
}
