//! Federation entities
//!
//! An `Entity` is an identifier plus the key ring it owns. It produces its
//! own Entity Configuration and the Subordinate Statements it issues about
//! others, always signed with its single federation key.

use chrono::Duration;
use tracing::info;

use crate::error::{FederationError, Result};
use crate::identifier::EntityId;
use crate::jwk::JwkSet;
use crate::keys::{KeyAlgorithm, KeyPair, KeyPurpose, KeyRing, KeySet};
use crate::statement::{
    metadata_type, AcmeIssuerMetadata, AcmeRequestorMetadata, EntityStatement,
    EntityStatementBuilder, UnsignedStatement, DEFAULT_STATEMENT_VALIDITY_SECS,
};

/// Options controlling key generation and published metadata
#[derive(Debug, Clone, PartialEq)]
pub struct EntityOptions {
    /// Algorithm of the federation signing key
    pub federation_algorithm: KeyAlgorithm,
    /// One certifiable key is generated per entry
    pub certifiable_algorithms: Vec<KeyAlgorithm>,
    /// Publish `acme_requestor` metadata with the certifiable keys
    pub acme_requestor: bool,
    /// Publish `acme_issuer` metadata pointing at this directory URL
    pub acme_issuer_directory: Option<String>,
    /// Lifetime of statements this entity signs
    pub statement_validity: Duration,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            federation_algorithm: KeyAlgorithm::Rsa2048,
            certifiable_algorithms: vec![KeyAlgorithm::Rsa2048, KeyAlgorithm::EcP256],
            acme_requestor: true,
            acme_issuer_directory: None,
            statement_validity: Duration::seconds(DEFAULT_STATEMENT_VALIDITY_SECS),
        }
    }
}

impl EntityOptions {
    pub fn with_federation_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.federation_algorithm = algorithm;
        self
    }

    pub fn with_certifiable_algorithms(mut self, algorithms: Vec<KeyAlgorithm>) -> Self {
        self.certifiable_algorithms = algorithms;
        self
    }

    /// Mark the entity as an ACME issuer
    pub fn with_acme_issuer_directory(mut self, directory: impl Into<String>) -> Self {
        self.acme_issuer_directory = Some(directory.into());
        self
    }

    /// Do not publish `acme_requestor` metadata
    pub fn without_acme_requestor(mut self) -> Self {
        self.acme_requestor = false;
        self
    }

    pub fn with_statement_validity(mut self, validity: Duration) -> Self {
        self.statement_validity = validity;
        self
    }
}

/// Federation participant holding its own key material
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    keys: KeyRing,
    options: EntityOptions,
}

impl Entity {
    /// Create an entity with freshly generated keys and default options
    pub fn generate(id: EntityId) -> Result<Self> {
        Self::with_options(id, EntityOptions::default())
    }

    /// Create an entity with freshly generated keys
    ///
    /// Fails as a whole if any key cannot be generated.
    pub fn with_options(id: EntityId, options: EntityOptions) -> Result<Self> {
        let mut keys = KeyRing::new();
        keys.generate(KeyPurpose::Federation, options.federation_algorithm)?;
        for algorithm in &options.certifiable_algorithms {
            keys.generate(KeyPurpose::Certifiable, *algorithm)?;
        }

        let entity = Self::from_key_ring(id, keys, options)?;
        info!(
            entity = %entity.id,
            certifiable_keys = entity.certifiable_keys().len(),
            "Created entity"
        );
        Ok(entity)
    }

    /// Create an entity from existing keys
    pub fn from_key_ring(id: EntityId, keys: KeyRing, options: EntityOptions) -> Result<Self> {
        keys.federation_key()?;
        if options.statement_validity <= Duration::zero() {
            return Err(FederationError::StatementConstruction(
                "statement validity must be positive".into(),
            ));
        }
        Ok(Self { id, keys, options })
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn options(&self) -> &EntityOptions {
        &self.options
    }

    pub fn key_ring(&self) -> &KeyRing {
        &self.keys
    }

    /// The key that signs this entity's statements
    pub fn federation_key(&self) -> Result<&KeyPair> {
        self.keys.federation_key()
    }

    /// Certifiable keys, private components included
    pub fn certifiable_keys(&self) -> &KeySet {
        self.keys.private_key_set(KeyPurpose::Certifiable)
    }

    /// Certifiable key of `algorithm`, or the first one when `None`
    pub fn certifiable_key(&self, algorithm: Option<KeyAlgorithm>) -> Option<&KeyPair> {
        match algorithm {
            Some(algorithm) => self.certifiable_keys().by_algorithm(algorithm),
            None => self.certifiable_keys().first(),
        }
    }

    /// Public federation JWKS
    pub fn federation_jwks(&self) -> JwkSet {
        self.keys.public_key_set(KeyPurpose::Federation).to_jwks()
    }

    /// Public certifiable JWKS
    pub fn certifiable_jwks(&self) -> JwkSet {
        self.keys.public_key_set(KeyPurpose::Certifiable).to_jwks()
    }

    /// Assemble this entity's Entity Configuration claims
    pub fn build_entity_configuration(
        &self,
        authority_hints: &[EntityId],
    ) -> Result<UnsignedStatement> {
        let mut builder = EntityStatementBuilder::new()
            .self_issued(self.id.clone())
            .jwks(self.federation_jwks())
            .authority_hints(authority_hints.to_vec())
            .validity(self.options.statement_validity);

        if self.options.acme_requestor && !self.certifiable_keys().is_empty() {
            let requestor = AcmeRequestorMetadata {
                jwks: self.certifiable_jwks(),
                iss: self.id.clone(),
                sub: self.id.clone(),
            };
            builder = builder.typed_metadata(metadata_type::ACME_REQUESTOR, &requestor)?;
        }

        if let Some(directory) = &self.options.acme_issuer_directory {
            let issuer = AcmeIssuerMetadata {
                directory: directory.clone(),
            };
            builder = builder.typed_metadata(metadata_type::ACME_ISSUER, &issuer)?;
        }

        builder.build()
    }

    /// Signed Entity Configuration
    pub fn entity_configuration(&self, authority_hints: &[EntityId]) -> Result<EntityStatement> {
        self.sign_statement(self.build_entity_configuration(authority_hints)?)
    }

    /// Signed Subordinate Statement vouching for `subject_jwks`
    pub fn subordinate_statement(
        &self,
        subject: &EntityId,
        subject_jwks: JwkSet,
    ) -> Result<EntityStatement> {
        if subject == &self.id {
            return Err(FederationError::StatementConstruction(
                "an entity cannot be its own subordinate".into(),
            ));
        }

        let unsigned = EntityStatementBuilder::new()
            .issuer(self.id.clone())
            .subject(subject.clone())
            .jwks(subject_jwks)
            .validity(self.options.statement_validity)
            .build()?;
        self.sign_statement(unsigned)
    }

    /// Sign with the federation key
    pub fn sign_statement(&self, unsigned: UnsignedStatement) -> Result<EntityStatement> {
        unsigned.sign(self.federation_key()?)
    }
}
