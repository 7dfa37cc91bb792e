//! In-process federation directory
//!
//! `LocalFederation` publishes hosted entities without a network: it is the
//! publish collaborator (entities become visible on `start_serving`) and the
//! fetch collaborator (statements are signed on request by the hosting
//! entity). Only served entities can be fetched.

use async_trait::async_trait;
use fedcert_core::EntityId;
use fedcert_trust::{StatementFetcher, TrustError, FETCH_PATH};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::{PlaneError, Result};
use crate::host::HostedEntity;
use crate::publish::Publisher;

/// Directory of hosted entities reachable in-process
#[derive(Debug, Default)]
pub struct LocalFederation {
    served: RwLock<HashMap<EntityId, Arc<HostedEntity>>>,
}

impl LocalFederation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Served entity with this identifier
    pub fn get(&self, id: &EntityId) -> Option<Arc<HostedEntity>> {
        self.served.read().unwrap().get(id).cloned()
    }

    fn served(
        &self,
        id: &EntityId,
        what: impl FnOnce() -> String,
    ) -> fedcert_trust::Result<Arc<HostedEntity>> {
        self.get(id).ok_or_else(|| TrustError::Fetch {
            what: what(),
            message: "entity is not being served".into(),
        })
    }
}

fn fetch_error(what: String, err: PlaneError) -> TrustError {
    match err {
        PlaneError::Trust(e) => e,
        other => TrustError::Fetch {
            what,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl StatementFetcher for LocalFederation {
    async fn fetch_entity_configuration(&self, id: &EntityId) -> fedcert_trust::Result<String> {
        let entity = self.served(id, || id.well_known_url())?;
        debug!(entity = %id, "Serving entity configuration in-process");

        entity
            .entity_configuration()
            .map(|statement| statement.into_compact())
            .map_err(|e| fetch_error(id.well_known_url(), e))
    }

    async fn fetch_subordinate_statement(
        &self,
        superior: &EntityId,
        subordinate: &EntityId,
    ) -> fedcert_trust::Result<String> {
        let what = || {
            format!(
                "{}{}?sub={}",
                superior.as_str().trim_end_matches('/'),
                FETCH_PATH,
                subordinate
            )
        };
        let entity = self.served(superior, what)?;
        debug!(
            superior = %superior,
            subordinate = %subordinate,
            "Serving subordinate statement in-process"
        );

        entity
            .subordinate_statement(subordinate)
            .await
            .map(|statement| statement.into_compact())
            .map_err(|e| fetch_error(what(), e))
    }

    fn description(&self) -> &str {
        "in-process federation directory"
    }
}

#[async_trait]
impl Publisher for LocalFederation {
    async fn start_serving(&self, entity: Arc<HostedEntity>) -> Result<()> {
        let mut served = self.served.write().unwrap();
        let id = entity.id().clone();
        if served.contains_key(&id) {
            return Err(PlaneError::AlreadyServing(id.to_string()));
        }
        debug!(entity = %id, "Serving entity in-process");
        served.insert(id, entity);
        Ok(())
    }

    async fn stop_serving(&self, id: &EntityId) -> Result<()> {
        self.served
            .write()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlaneError::EntityNotFound(id.to_string()))
    }

    fn is_serving(&self, id: &EntityId) -> bool {
        self.served.read().unwrap().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedcert_core::{Entity, EntityOptions, KeyAlgorithm, UnverifiedStatement};
    use fedcert_trust::FederationGraph;

    fn hosted(id: &str, graph: &Arc<FederationGraph>) -> Arc<HostedEntity> {
        let options = EntityOptions::default()
            .with_federation_algorithm(KeyAlgorithm::EcP256)
            .with_certifiable_algorithms(vec![KeyAlgorithm::EcP256]);
        let entity = Entity::with_options(EntityId::parse(id).unwrap(), options).unwrap();
        Arc::new(HostedEntity::new(entity, graph.clone()))
    }

    #[tokio::test]
    async fn test_only_served_entities_are_fetchable() {
        let graph = Arc::new(FederationGraph::new());
        let directory = LocalFederation::new();
        let leaf = hosted("https://leaf.example", &graph);

        assert!(directory.fetch_entity_configuration(leaf.id()).await.is_err());

        directory.start_serving(leaf.clone()).await.unwrap();
        let compact = directory.fetch_entity_configuration(leaf.id()).await.unwrap();
        let statement = UnverifiedStatement::parse(&compact)
            .unwrap()
            .verify_self_signed()
            .unwrap();
        assert_eq!(statement.sub(), leaf.id());

        directory.stop_serving(leaf.id()).await.unwrap();
        assert!(!directory.is_serving(leaf.id()));
        assert!(matches!(
            directory.fetch_entity_configuration(leaf.id()).await,
            Err(TrustError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_subordinate_statement_through_directory() {
        let graph = Arc::new(FederationGraph::new());
        let directory = LocalFederation::new();
        let ta = hosted("https://ta.example", &graph);
        let leaf = hosted("https://leaf.example", &graph);

        directory.start_serving(ta.clone()).await.unwrap();
        directory.start_serving(leaf.clone()).await.unwrap();
        ta.add_subordinates(&[leaf.id().clone()], &directory)
            .await
            .unwrap();

        let compact = directory
            .fetch_subordinate_statement(ta.id(), leaf.id())
            .await
            .unwrap();
        let statement = UnverifiedStatement::parse(&compact)
            .unwrap()
            .verify(&ta.entity().federation_jwks())
            .unwrap();
        assert_eq!(statement.iss(), ta.id());
        assert_eq!(statement.sub(), leaf.id());

        let stranger = EntityId::parse("https://stranger.example").unwrap();
        assert!(matches!(
            directory.fetch_subordinate_statement(ta.id(), &stranger).await,
            Err(TrustError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let graph = Arc::new(FederationGraph::new());
        let directory = LocalFederation::new();
        let leaf = hosted("https://leaf.example", &graph);

        directory.start_serving(leaf.clone()).await.unwrap();
        assert!(matches!(
            directory.start_serving(leaf).await,
            Err(PlaneError::AlreadyServing(_))
        ));
    }
}
