// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ArchonError;

/// A semver `X.Y.Z` tag selecting a payload layout for a given `event_type`
/// (§3.1, §9 "dynamic typing -> explicit variants").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        SchemaVersion { major, minor, patch }
    }

    pub fn parse(raw: &str) -> Result<Self, ArchonError> {
        let mut parts = raw.split('.');
        let (a, b, c, rest) = (parts.next(), parts.next(), parts.next(), parts.next());
        if rest.is_some() {
            return Err(ArchonError::SchemaInvalid(format!(
                "schema_version '{raw}' has more than three components"
            )));
        }
        let parse_component = |maybe: Option<&str>| -> Result<u32, ArchonError> {
            maybe
                .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
                .ok_or_else(|| {
                    ArchonError::SchemaInvalid(format!(
                        "schema_version '{raw}' does not match ^\\d+\\.\\d+\\.\\d+$"
                    ))
                })
                .and_then(|s| {
                    s.parse::<u32>().map_err(|_| {
                        ArchonError::SchemaInvalid(format!("schema_version component overflow in '{raw}'"))
                    })
                })
        };
        Ok(SchemaVersion {
            major: parse_component(a)?,
            minor: parse_component(b)?,
            patch: parse_component(c)?,
        })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = ArchonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SchemaVersion::parse(&value)
    }
}

impl From<SchemaVersion> for String {
    fn from(value: SchemaVersion) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let v = SchemaVersion::parse("1.2.3").unwrap();
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_non_numeric_or_wrong_arity() {
        assert!(SchemaVersion::parse("1.2").is_err());
        assert!(SchemaVersion::parse("1.2.3.4").is_err());
        assert!(SchemaVersion::parse("a.b.c").is_err());
    }
}
