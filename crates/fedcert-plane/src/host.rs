//! Hosted entities
//!
//! A `HostedEntity` is an entity this process operates: it signs the
//! entity's configuration on demand, records the superiors it declares, and
//! keeps the subordinate records it signs Subordinate Statements from.

use fedcert_core::{Entity, EntityId, EntityStatement, UnverifiedStatement};
use fedcert_trust::{FederationGraph, StatementFetcher, TrustError};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PlaneError, Result};
use crate::storage::{MemoryStore, SubordinateRecord, SubordinateStore};

/// Entity operated by this process
#[derive(Debug)]
pub struct HostedEntity {
    entity: Entity,
    graph: Arc<FederationGraph>,
    store: Arc<dyn SubordinateStore>,
}

impl HostedEntity {
    /// Host `entity`, recording edges in `graph`, with in-memory records
    pub fn new(entity: Entity, graph: Arc<FederationGraph>) -> Self {
        Self::with_store(entity, graph, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(
        entity: Entity,
        graph: Arc<FederationGraph>,
        store: Arc<dyn SubordinateStore>,
    ) -> Self {
        Self {
            entity,
            graph,
            store,
        }
    }

    pub fn id(&self) -> &EntityId {
        self.entity.id()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Declare `superior` as an authority of this entity
    ///
    /// Declarations are published as `authority_hints` in declaration order.
    pub fn add_superior(&self, superior: &EntityId) {
        if self.graph.add_superior(self.id(), superior) {
            info!(entity = %self.id(), superior = %superior, "Declared superior");
        }
    }

    /// Superiors published in this entity's configuration
    pub fn authority_hints(&self) -> Vec<EntityId> {
        self.graph.superiors_of(self.id())
    }

    /// Freshly signed Entity Configuration
    pub fn entity_configuration(&self) -> Result<EntityStatement> {
        Ok(self.entity.entity_configuration(&self.authority_hints())?)
    }

    /// Register subordinates, recording the federation keys each publishes
    ///
    /// Every subordinate's configuration is fetched and self-verified before
    /// anything is recorded for it. Stops at the first failure; subordinates
    /// registered before it stay registered.
    pub async fn add_subordinates(
        &self,
        subordinates: &[EntityId],
        fetcher: &dyn StatementFetcher,
    ) -> Result<Vec<EntityId>> {
        let mut added = Vec::with_capacity(subordinates.len());

        for subordinate in subordinates {
            if subordinate == self.id() {
                return Err(PlaneError::Federation(
                    fedcert_core::FederationError::StatementConstruction(
                        "an entity cannot be its own subordinate".into(),
                    ),
                ));
            }

            let compact = fetcher.fetch_entity_configuration(subordinate).await?;
            let configuration = UnverifiedStatement::parse(&compact)
                .and_then(UnverifiedStatement::verify_self_signed)
                .map_err(|e| {
                    warn!(subordinate = %subordinate, error = %e, "Subordinate configuration rejected");
                    TrustError::Verification {
                        entity: subordinate.to_string(),
                        source: e,
                    }
                })?;

            if configuration.sub() != subordinate {
                return Err(TrustError::SubjectMismatch {
                    expected: subordinate.to_string(),
                    actual: configuration.sub().to_string(),
                }
                .into());
            }

            self.store
                .register(SubordinateRecord::new(
                    subordinate.clone(),
                    configuration.claims().jwks.clone(),
                ))
                .await?;
            self.graph.add_subordinate(self.id(), subordinate);

            info!(superior = %self.id(), subordinate = %subordinate, "Added subordinate");
            added.push(subordinate.clone());
        }

        Ok(added)
    }

    /// Signed Subordinate Statement about a registered subordinate
    pub async fn subordinate_statement(&self, subordinate: &EntityId) -> Result<EntityStatement> {
        let record = self
            .store
            .get(subordinate)
            .await?
            .ok_or_else(|| PlaneError::UnknownSubordinate(subordinate.to_string()))?;

        Ok(self
            .entity
            .subordinate_statement(&record.entity_id, record.jwks)?)
    }

    /// Registered subordinates in registration order
    pub async fn subordinates(&self) -> Result<Vec<EntityId>> {
        Ok(self.store.list().await?)
    }
}
