//! Verified trust chains

use fedcert_core::{EntityId, EntityStatement};
use serde::de::DeserializeOwned;

use crate::error::{Result, TrustError};

/// One entity in a trust chain
///
/// `authority` is the Subordinate Statement the next entity up the chain
/// issued about this one; it is absent only for the trust anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    configuration: EntityStatement,
    authority: Option<EntityStatement>,
}

impl ChainLink {
    pub(crate) fn anchor(configuration: EntityStatement) -> Self {
        Self {
            configuration,
            authority: None,
        }
    }

    pub(crate) fn subordinate(configuration: EntityStatement, authority: EntityStatement) -> Self {
        Self {
            configuration,
            authority: Some(authority),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        self.configuration.sub()
    }

    /// Verified Entity Configuration
    pub fn configuration(&self) -> &EntityStatement {
        &self.configuration
    }

    /// Verified Subordinate Statement about this entity
    pub fn authority(&self) -> Option<&EntityStatement> {
        self.authority.as_ref()
    }
}

/// Chain of verified statements from a leaf to a trust anchor
///
/// Index 0 is the leaf, the last link is the trust anchor. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustChain {
    links: Vec<ChainLink>,
}

impl TrustChain {
    pub(crate) fn new(links: Vec<ChainLink>) -> Self {
        debug_assert!(!links.is_empty());
        Self { links }
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Number of entities in the chain
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn leaf(&self) -> Option<&ChainLink> {
        self.links.first()
    }

    pub fn trust_anchor(&self) -> Option<&ChainLink> {
        self.links.last()
    }

    /// Entity identifiers from leaf to anchor
    pub fn entity_ids(&self) -> Vec<&EntityId> {
        self.links.iter().map(ChainLink::entity_id).collect()
    }

    /// Verified Entity Configurations from leaf to anchor
    pub fn configurations(&self) -> impl Iterator<Item = &EntityStatement> {
        self.links.iter().map(ChainLink::configuration)
    }

    /// First metadata entry of `kind`, scanning from the leaf outward
    pub fn find_metadata(&self, kind: &str) -> Result<&serde_json::Value> {
        self.links
            .iter()
            .flat_map(|link| std::iter::once(&link.configuration).chain(link.authority.as_ref()))
            .find_map(|statement| statement.claims().metadata_entry(kind))
            .ok_or_else(|| TrustError::MetadataNotFound(kind.to_string()))
    }

    /// Decoded metadata of `kind`
    pub fn find_typed_metadata<T: DeserializeOwned>(&self, kind: &str) -> Result<T> {
        let value = self.find_metadata(kind)?;
        serde_json::from_value(value.clone()).map_err(|e| TrustError::Verification {
            entity: kind.to_string(),
            source: e.into(),
        })
    }

    /// Compact statements as attached to a challenge response
    ///
    /// Each entity's configuration followed by the Subordinate Statement its
    /// superior issued about it, ending with the anchor configuration. This
    /// is enough for a verifier to resolve the chain again offline.
    pub fn to_compact(&self) -> Vec<String> {
        self.links
            .iter()
            .flat_map(|link| std::iter::once(&link.configuration).chain(link.authority.as_ref()))
            .map(|statement| statement.compact().to_string())
            .collect()
    }
}
