//! Error types for hosting, publication and challenge solving

use fedcert_core::FederationError;
use fedcert_trust::TrustError;
use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type for plane operations
pub type Result<T> = std::result::Result<T, PlaneError>;

/// Errors that can occur in the plane
#[derive(Error, Debug)]
pub enum PlaneError {
    /// Key or statement failure
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Fetch or trust chain failure
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No local entity with this identifier
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// No subordinate record for this identifier
    #[error("Unknown subordinate: {0}")]
    UnknownSubordinate(String),

    /// Authorization identifier is not an OpenID Federation identifier
    #[error("Unsupported identifier type: {0}")]
    UnsupportedIdentifier(String),

    /// Authorization carries no openid-federation-01 challenge
    #[error("No openid-federation-01 challenge in authorization for {0}")]
    NoChallenge(String),

    /// The challenge token could not be signed
    #[error("Signing challenge failed for {entity}: {source}")]
    SigningFailed {
        entity: String,
        #[source]
        source: FederationError,
    },

    /// Attached trust chain ends at an anchor without pinned keys
    #[error("Trust anchor {0} has no pinned keys; attached chains cannot end there")]
    UnpinnedTrustAnchor(String),

    /// The CA rejected the challenge response
    #[error("Challenge validation failed: {0}")]
    Validation(String),

    /// Protocol path that is not implemented
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Entity is already being served
    #[error("Already serving {0}")]
    AlreadyServing(String),

    /// Listener or server failure
    #[error("Publication failed: {0}")]
    Publish(String),

    /// Solve or validation exceeded its time budget
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for PlaneError {
    fn from(err: std::io::Error) -> Self {
        PlaneError::Publish(err.to_string())
    }
}
