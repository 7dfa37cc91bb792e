//! Entity identifiers
//!
//! An OpenID Federation entity is identified by an `https` URL. Identifiers
//! are compared as exact strings: no case folding, no trailing-slash or
//! default-port normalization.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FederationError, Result};

/// Path, relative to an entity identifier, where its Entity Configuration is published
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-federation";

/// Federation entity identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Parse an identifier, requiring the `https` scheme and a non-empty host
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let rest = value
            .strip_prefix("https://")
            .ok_or_else(|| FederationError::InvalidIdentifier(value.clone()))?;

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();

        if host.is_empty()
            || host.starts_with(':')
            || value.contains('#')
            || value.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(FederationError::InvalidIdentifier(value));
        }

        Ok(Self(value))
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL of the well-known Entity Configuration document
    pub fn well_known_url(&self) -> String {
        format!("{}{}", self.0.trim_end_matches('/'), WELL_KNOWN_PATH)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntityId::parse(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_https() {
        let id = EntityId::parse("https://leaf.example.com").unwrap();
        assert_eq!(id.as_str(), "https://leaf.example.com");
        assert_eq!(
            id.well_known_url(),
            "https://leaf.example.com/.well-known/openid-federation"
        );
    }

    #[test]
    fn test_rejects_insecure_and_malformed() {
        assert!(EntityId::parse("http://leaf.example.com").is_err());
        assert!(EntityId::parse("leaf.example.com").is_err());
        assert!(EntityId::parse("https://").is_err());
        assert!(EntityId::parse("https:///path").is_err());
        assert!(EntityId::parse("https://leaf.example.com#frag").is_err());
        assert!(EntityId::parse("https://leaf example.com").is_err());
    }

    #[test]
    fn test_exact_comparison() {
        let a = EntityId::parse("https://leaf.example.com").unwrap();
        let b = EntityId::parse("https://leaf.example.com/").unwrap();
        let c = EntityId::parse("https://LEAF.example.com").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: EntityId = serde_json::from_str("\"https://ta.example\"").unwrap();
        assert_eq!(ok.as_str(), "https://ta.example");

        let bad: std::result::Result<EntityId, _> = serde_json::from_str("\"http://ta.example\"");
        assert!(bad.is_err());
    }
}
