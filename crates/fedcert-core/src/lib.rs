//! # Fedcert Core
//!
//! Key material, entity statements and challenge signatures for OpenID
//! Federation backed certificate issuance.
//!
//! ## Key Concepts
//!
//! - **Entity**: a federation participant identified by an `https` URL
//! - **Federation key**: signs the entity's own trust statements
//! - **Certifiable key**: a key the entity wants certified; signs only ACME
//!   challenge tokens
//! - **Entity Configuration**: self-signed statement of identity, keys and
//!   metadata
//! - **Subordinate Statement**: a superior vouching for a subordinate's keys
//!
//! ## Invariants
//!
//! 1. **Key ID**: every key's `kid` is its RFC 7638 thumbprint
//! 2. **Separation**: statements are signed only by federation keys,
//!    challenges only by certifiable keys
//! 3. **Projection**: published key sets never carry private components

pub mod challenge;
pub mod entity;
pub mod error;
pub mod identifier;
pub mod jwk;
pub mod jws;
pub mod keys;
pub mod statement;

pub use challenge::{
    sign_challenge, verify_challenge_signature, ChallengeResponse, CHALLENGE_TYPE,
    IDENTIFIER_TYPE,
};
pub use entity::{Entity, EntityOptions};
pub use error::{FederationError, Result};
pub use identifier::{EntityId, WELL_KNOWN_PATH};
pub use jwk::{Jwk, JwkSet};
pub use keys::{KeyAlgorithm, KeyPair, KeyPurpose, KeyRing, KeySet};
pub use statement::{
    metadata_type, AcmeIssuerMetadata, AcmeRequestorMetadata, EntityStatement,
    EntityStatementBuilder, EntityStatementClaims, UnsignedStatement, UnverifiedStatement,
    ENTITY_STATEMENT_TYP,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
