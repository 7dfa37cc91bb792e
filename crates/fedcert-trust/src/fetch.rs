//! Statement fetching
//!
//! The resolver never talks to the network itself. It asks a
//! `StatementFetcher` for compact statements and verifies whatever comes
//! back. Fetchers do not retry.

use async_trait::async_trait;
use fedcert_core::{EntityId, UnverifiedStatement};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, TrustError};

/// Source of compact-serialized entity statements
#[async_trait]
pub trait StatementFetcher: Send + Sync {
    /// Fetch the Entity Configuration `id` publishes about itself
    async fn fetch_entity_configuration(&self, id: &EntityId) -> Result<String>;

    /// Fetch the Subordinate Statement `superior` issues about `subordinate`
    async fn fetch_subordinate_statement(
        &self,
        superior: &EntityId,
        subordinate: &EntityId,
    ) -> Result<String>;

    /// Get a description of this fetcher (for logging)
    fn description(&self) -> &str {
        "statement fetcher"
    }
}

#[async_trait]
impl<T: StatementFetcher + ?Sized> StatementFetcher for Arc<T> {
    async fn fetch_entity_configuration(&self, id: &EntityId) -> Result<String> {
        (**self).fetch_entity_configuration(id).await
    }

    async fn fetch_subordinate_statement(
        &self,
        superior: &EntityId,
        subordinate: &EntityId,
    ) -> Result<String> {
        (**self).fetch_subordinate_statement(superior, subordinate).await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Fetcher serving pre-signed statements from memory
///
/// Useful for tests and for verifying a chain a requestor attached to its
/// challenge response.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    configurations: RwLock<HashMap<EntityId, String>>,
    subordinate_statements: RwLock<HashMap<(EntityId, EntityId), String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every statement of an attached trust chain
    ///
    /// Statements are filed under their unverified `iss`/`sub`; nothing is
    /// trusted until a resolver verifies it.
    pub fn from_statements(statements: &[String]) -> Result<Self> {
        let fetcher = Self::new();
        for compact in statements {
            let parsed = UnverifiedStatement::parse(compact)
                .map_err(|e| TrustError::verification("trust_chain", e))?;
            let claims = parsed.claims();
            if claims.is_entity_configuration() {
                fetcher.insert_configuration(claims.sub.clone(), compact.as_str());
            } else {
                fetcher.insert_subordinate_statement(
                    claims.iss.clone(),
                    claims.sub.clone(),
                    compact.as_str(),
                );
            }
        }
        Ok(fetcher)
    }

    /// Serve `compact` as the Entity Configuration of `id`
    pub fn insert_configuration(&self, id: EntityId, compact: impl Into<String>) {
        self.configurations
            .write()
            .unwrap()
            .insert(id, compact.into());
    }

    /// Serve `compact` as the statement `superior` issues about `subordinate`
    pub fn insert_subordinate_statement(
        &self,
        superior: EntityId,
        subordinate: EntityId,
        compact: impl Into<String>,
    ) {
        self.subordinate_statements
            .write()
            .unwrap()
            .insert((superior, subordinate), compact.into());
    }
}

#[async_trait]
impl StatementFetcher for MemoryFetcher {
    async fn fetch_entity_configuration(&self, id: &EntityId) -> Result<String> {
        self.configurations
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| TrustError::Fetch {
                what: id.well_known_url(),
                message: "not found".into(),
            })
    }

    async fn fetch_subordinate_statement(
        &self,
        superior: &EntityId,
        subordinate: &EntityId,
    ) -> Result<String> {
        self.subordinate_statements
            .read()
            .unwrap()
            .get(&(superior.clone(), subordinate.clone()))
            .cloned()
            .ok_or_else(|| TrustError::Fetch {
                what: format!("statement by {} about {}", superior, subordinate),
                message: "not found".into(),
            })
    }

    fn description(&self) -> &str {
        "in-memory statement fetcher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_memory_fetcher_serves_inserted() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert_configuration(id("https://a.example"), "a.b.c");
        fetcher.insert_subordinate_statement(id("https://ta.example"), id("https://a.example"), "d.e.f");

        assert_eq!(
            fetcher.fetch_entity_configuration(&id("https://a.example")).await.unwrap(),
            "a.b.c"
        );
        assert_eq!(
            fetcher
                .fetch_subordinate_statement(&id("https://ta.example"), &id("https://a.example"))
                .await
                .unwrap(),
            "d.e.f"
        );
    }

    #[tokio::test]
    async fn test_memory_fetcher_missing() {
        let fetcher = Arc::new(MemoryFetcher::new());

        let result = fetcher.fetch_entity_configuration(&id("https://a.example")).await;
        assert!(matches!(result, Err(TrustError::Fetch { .. })));

        let result = fetcher
            .fetch_subordinate_statement(&id("https://a.example"), &id("https://ta.example"))
            .await;
        assert!(matches!(result, Err(TrustError::Fetch { .. })));
    }
}
