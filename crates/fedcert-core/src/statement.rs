//! Entity statements
//!
//! An entity statement is a compact JWS with header `typ` set to
//! `entity-statement+jwt`. Two kinds are produced:
//!
//! - **Entity Configuration**: self-issued (`iss == sub`), published at the
//!   entity's well-known URL, lists the entity's federation keys and its
//!   authority hints
//! - **Subordinate Statement**: issued by a superior about a subordinate,
//!   `jwks` holds the subordinate's federation keys
//!
//! Lifecycle: `EntityStatementBuilder` -> `UnsignedStatement` -> `sign` ->
//! `EntityStatement`; received statements go `UnverifiedStatement::parse` ->
//! `verify` -> `EntityStatement`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{FederationError, Result};
use crate::identifier::EntityId;
use crate::jwk::JwkSet;
use crate::jws::{sign_compact, CompactJws};
use crate::keys::{KeyPair, KeyPurpose};

/// Header `typ` of every entity statement
pub const ENTITY_STATEMENT_TYP: &str = "entity-statement+jwt";

/// Default lifetime of a statement (one hour)
pub const DEFAULT_STATEMENT_VALIDITY_SECS: i64 = 3600;

/// Tolerated clock skew when checking `iat`
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Metadata type keys
pub mod metadata_type {
    /// Entity requesting certificates for its certifiable keys
    pub const ACME_REQUESTOR: &str = "acme_requestor";
    /// Entity operating an ACME CA
    pub const ACME_ISSUER: &str = "acme_issuer";
    /// Generic federation entity
    pub const FEDERATION_ENTITY: &str = "federation_entity";
}

/// Metadata of a statement, keyed by metadata type
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Claims of an entity statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatementClaims {
    /// Issuer
    pub iss: EntityId,
    /// Subject
    pub sub: EntityId,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration (seconds since epoch)
    pub exp: i64,
    /// Federation keys of the subject
    pub jwks: JwkSet,
    /// Immediate superiors of the subject (Entity Configurations only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authority_hints: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl EntityStatementClaims {
    /// Whether these claims describe an Entity Configuration
    pub fn is_entity_configuration(&self) -> bool {
        self.iss == self.sub
    }

    /// Raw metadata of one type
    pub fn metadata_entry(&self, kind: &str) -> Option<&serde_json::Value> {
        self.metadata.get(kind)
    }

    /// Metadata of one type, decoded
    pub fn typed_metadata<T: serde::de::DeserializeOwned>(&self, kind: &str) -> Result<Option<T>> {
        self.metadata
            .get(kind)
            .map(|v| serde_json::from_value(v.clone()).map_err(FederationError::from))
            .transpose()
    }

    /// Check `exp` and `iat` against `now`
    pub fn validate_temporal(&self, now: i64) -> Result<()> {
        if self.exp <= now {
            return Err(FederationError::Expired { exp: self.exp, now });
        }
        if self.iat > now + MAX_CLOCK_SKEW_SECS {
            return Err(FederationError::IssuedInFuture { iat: self.iat, now });
        }
        Ok(())
    }
}

/// `acme_requestor` metadata: the keys the entity wants certified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcmeRequestorMetadata {
    /// Certifiable public keys
    pub jwks: JwkSet,
    pub iss: EntityId,
    pub sub: EntityId,
}

/// `acme_issuer` metadata: where the CA's ACME directory lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeIssuerMetadata {
    pub directory: String,
}

/// Builder for entity statements
///
/// ```ignore
/// let unsigned = EntityStatementBuilder::new()
///     .issuer(superior.clone())
///     .subject(subordinate.clone())
///     .jwks(subordinate_jwks)
///     .build()?;
/// let statement = unsigned.sign(federation_key)?;
/// ```
#[derive(Debug)]
pub struct EntityStatementBuilder {
    iss: Option<EntityId>,
    sub: Option<EntityId>,
    jwks: Option<JwkSet>,
    authority_hints: Vec<EntityId>,
    metadata: Metadata,
    issued_at: Option<DateTime<Utc>>,
    validity: Duration,
}

impl Default for EntityStatementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStatementBuilder {
    pub fn new() -> Self {
        Self {
            iss: None,
            sub: None,
            jwks: None,
            authority_hints: Vec::new(),
            metadata: Metadata::new(),
            issued_at: None,
            validity: Duration::seconds(DEFAULT_STATEMENT_VALIDITY_SECS),
        }
    }

    pub fn issuer(mut self, iss: EntityId) -> Self {
        self.iss = Some(iss);
        self
    }

    pub fn subject(mut self, sub: EntityId) -> Self {
        self.sub = Some(sub);
        self
    }

    /// Set issuer and subject to the same entity
    pub fn self_issued(self, id: EntityId) -> Self {
        self.issuer(id.clone()).subject(id)
    }

    /// Federation keys of the subject
    pub fn jwks(mut self, jwks: JwkSet) -> Self {
        self.jwks = Some(jwks);
        self
    }

    pub fn authority_hints(mut self, hints: Vec<EntityId>) -> Self {
        self.authority_hints = hints;
        self
    }

    /// Add raw metadata of one type
    pub fn metadata(mut self, kind: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(kind.into(), value);
        self
    }

    /// Add serializable metadata of one type
    pub fn typed_metadata<T: Serialize>(self, kind: impl Into<String>, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.metadata(kind, value))
    }

    /// Issue time, defaults to now
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Lifetime, `exp = iat + validity`
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Assemble the claims
    pub fn build(self) -> Result<UnsignedStatement> {
        let iss = self
            .iss
            .ok_or_else(|| FederationError::StatementConstruction("missing iss".into()))?;
        let sub = self
            .sub
            .ok_or_else(|| FederationError::StatementConstruction("missing sub".into()))?;
        let jwks = self
            .jwks
            .ok_or_else(|| FederationError::StatementConstruction("missing jwks".into()))?;

        if jwks.is_empty() {
            return Err(FederationError::StatementConstruction(
                "jwks must contain at least one key".into(),
            ));
        }
        if self.validity <= Duration::zero() {
            return Err(FederationError::StatementConstruction(
                "validity must be positive".into(),
            ));
        }
        if iss != sub && !self.authority_hints.is_empty() {
            return Err(FederationError::StatementConstruction(
                "authority_hints are only allowed in Entity Configurations".into(),
            ));
        }

        let iat = self.issued_at.unwrap_or_else(Utc::now).timestamp();
        let exp = iat + self.validity.num_seconds();

        Ok(UnsignedStatement {
            claims: EntityStatementClaims {
                iss,
                sub,
                iat,
                exp,
                jwks,
                authority_hints: self.authority_hints,
                metadata: self.metadata,
            },
        })
    }
}

/// Statement claims awaiting a signature
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedStatement {
    claims: EntityStatementClaims,
}

impl UnsignedStatement {
    pub fn claims(&self) -> &EntityStatementClaims {
        &self.claims
    }

    /// Sign with a federation key
    ///
    /// A self-issued statement must be signed by one of the keys it
    /// publishes, otherwise nobody could verify it.
    pub fn sign(self, key: &KeyPair) -> Result<EntityStatement> {
        key.ensure_purpose(KeyPurpose::Federation)?;
        if key.kid().is_empty() {
            return Err(FederationError::MissingKeyId);
        }
        if self.claims.is_entity_configuration() && !self.claims.jwks.contains(key.kid()) {
            return Err(FederationError::Signing(format!(
                "key {} is not published in the configuration jwks",
                key.kid()
            )));
        }

        let payload = serde_json::to_vec(&self.claims)?;
        let compact = sign_compact(Some(ENTITY_STATEMENT_TYP), &payload, key)?;

        debug!(
            iss = %self.claims.iss,
            sub = %self.claims.sub,
            kid = %key.kid(),
            "Signed entity statement"
        );

        Ok(EntityStatement {
            compact,
            kid: key.kid().to_string(),
            claims: self.claims,
        })
    }
}

/// Signed entity statement whose signature is known to be valid
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStatement {
    compact: String,
    kid: String,
    claims: EntityStatementClaims,
}

impl EntityStatement {
    /// Compact JWS serialization
    pub fn compact(&self) -> &str {
        &self.compact
    }

    pub fn into_compact(self) -> String {
        self.compact
    }

    pub fn claims(&self) -> &EntityStatementClaims {
        &self.claims
    }

    /// Key ID that signed this statement
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn iss(&self) -> &EntityId {
        &self.claims.iss
    }

    pub fn sub(&self) -> &EntityId {
        &self.claims.sub
    }

    pub fn is_entity_configuration(&self) -> bool {
        self.claims.is_entity_configuration()
    }
}

/// Received statement, claims decoded but signature not yet checked
#[derive(Debug, Clone)]
pub struct UnverifiedStatement {
    compact: String,
    jws: CompactJws,
    claims: EntityStatementClaims,
}

impl UnverifiedStatement {
    /// Parse a compact statement, checking the header `typ`
    pub fn parse(compact: &str) -> Result<Self> {
        let jws = CompactJws::parse(compact)?;

        let typ = jws.header().typ.as_deref().unwrap_or_default();
        if typ != ENTITY_STATEMENT_TYP {
            return Err(FederationError::UnexpectedType {
                expected: ENTITY_STATEMENT_TYP.to_string(),
                actual: typ.to_string(),
            });
        }

        let claims: EntityStatementClaims = serde_json::from_slice(jws.payload())
            .map_err(|e| FederationError::Malformed(format!("statement claims: {}", e)))?;

        Ok(Self {
            compact: compact.to_string(),
            jws,
            claims,
        })
    }

    /// Claims as presented, not to be trusted before verification
    pub fn claims(&self) -> &EntityStatementClaims {
        &self.claims
    }

    pub fn kid(&self) -> Result<&str> {
        self.jws.kid()
    }

    /// Verify against the issuer's federation keys at the current time
    pub fn verify(self, keys: &JwkSet) -> Result<EntityStatement> {
        self.verify_at(keys, Utc::now().timestamp())
    }

    /// Verify against the issuer's federation keys at `now`
    ///
    /// Checks run in order: header kid, key lookup by kid, algorithm,
    /// signature, then `exp` and `iat`.
    pub fn verify_at(self, keys: &JwkSet, now: i64) -> Result<EntityStatement> {
        let kid = self.jws.kid()?.to_string();
        let jwk = keys
            .find(&kid)
            .ok_or_else(|| FederationError::KeyNotFound(kid.clone()))?;
        let key = KeyPair::from_jwk(KeyPurpose::Federation, jwk)?;

        self.jws.verify(&key)?;
        self.claims.validate_temporal(now)?;

        Ok(EntityStatement {
            compact: self.compact,
            kid,
            claims: self.claims,
        })
    }

    /// Verify a self-issued Entity Configuration against its own `jwks`
    pub fn verify_self_signed(self) -> Result<EntityStatement> {
        self.verify_self_signed_at(Utc::now().timestamp())
    }

    pub fn verify_self_signed_at(self, now: i64) -> Result<EntityStatement> {
        if !self.claims.is_entity_configuration() {
            return Err(FederationError::NotSelfIssued {
                iss: self.claims.iss.to_string(),
                sub: self.claims.sub.to_string(),
            });
        }
        let keys = self.claims.jwks.clone();
        self.verify_at(&keys, now)
    }
}
