//! Newtype wrapper for extension identifiers.
//!
//! Identifiers are compared and ordered lexicographically; that ordering is
//! the tie-break used everywhere a deterministic choice has to be made.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Globally unique identifier of a discovered extension.
///
/// Deserialization goes through [`FromStr`], so blank ids are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExtensionId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Extension id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for ExtensionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<&str> for ExtensionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExtensionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ExtensionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ExtensionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut ids = vec![
            ExtensionId::from("common"),
            ExtensionId::from("Zeta"),
            ExtensionId::from("alpha"),
        ];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(ExtensionId::as_str).collect();
        assert_eq!(names, vec!["Zeta", "alpha", "common"]);
    }

    #[test]
    fn test_from_str_rejects_blank() {
        assert!("   ".parse::<ExtensionId>().is_err());
        let id: ExtensionId = " moonbase ".parse().expect("should parse");
        assert_eq!(id.as_str(), "moonbase");
    }

    #[test]
    fn test_serde_transparent() {
        let id = ExtensionId::from("spacepack");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"spacepack\"");
        let parsed: ExtensionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_deserialize_rejects_blank() {
        assert!(serde_json::from_str::<ExtensionId>("\"\"").is_err());
        assert!(serde_json::from_str::<ExtensionId>("\"   \"").is_err());
        let trimmed: ExtensionId = serde_json::from_str("\" settings \"").expect("deserialize");
        assert_eq!(trimmed.as_str(), "settings");
    }
}
