//! Error types for trust chain resolution

use fedcert_core::FederationError;
use std::time::Duration;
use thiserror::Error;

/// Result type for trust operations
pub type Result<T> = std::result::Result<T, TrustError>;

/// Errors that can occur while fetching statements or resolving chains
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// Transport failure fetching a statement
    #[error("Failed to fetch {what}: {message}")]
    Fetch { what: String, message: String },

    /// Statement failed parsing, signature or expiry checks
    #[error("Verification failed for {entity}: {source}")]
    Verification {
        entity: String,
        #[source]
        source: FederationError,
    },

    /// Statement is about a different subject than requested
    #[error("Subject mismatch: expected {expected}, got {actual}")]
    SubjectMismatch { expected: String, actual: String },

    /// Statement was issued by a different entity than expected
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    /// Superior does not vouch for the key that signed the subordinate's configuration
    #[error("Key {kid} of {entity} is not vouched for by {superior}")]
    UnvouchedKey {
        entity: String,
        superior: String,
        kid: String,
    },

    /// Trust anchor configuration signed by a key other than its pinned keys
    #[error("Trust anchor {anchor} signed with unpinned key {kid}")]
    UnpinnedAnchorKey { anchor: String, kid: String },

    /// Entity lists itself as its own superior
    #[error("Entity {0} declares itself as its own superior")]
    SelfSuperior(String),

    /// Entity revisited along one resolution path
    #[error("Cycle detected at {entity} (path: {path})")]
    CycleDetected { entity: String, path: String },

    /// Chain would exceed the configured maximum length
    #[error("Maximum chain depth {0} exceeded")]
    DepthExceeded(usize),

    /// No verified path to a trust anchor
    #[error("No trust anchor reachable from {0}")]
    NoTrustAnchor(String),

    /// No statement in the chain carries the requested metadata
    #[error("Metadata '{0}' not found in trust chain")]
    MetadataNotFound(String),

    /// Resolution exceeded its time budget
    #[error("Resolution timed out after {0:?}")]
    Timeout(Duration),

    /// Resolution was cancelled
    #[error("Resolution cancelled")]
    Cancelled,
}

impl TrustError {
    /// Errors that abort the whole resolution instead of moving on to the next superior
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TrustError::CycleDetected { .. }
                | TrustError::DepthExceeded(_)
                | TrustError::Timeout(_)
                | TrustError::Cancelled
        )
    }

    pub(crate) fn verification(entity: impl ToString, source: FederationError) -> Self {
        TrustError::Verification {
            entity: entity.to_string(),
            source,
        }
    }
}

impl From<reqwest::Error> for TrustError {
    fn from(err: reqwest::Error) -> Self {
        TrustError::Fetch {
            what: err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "statement".into()),
            message: err.to_string(),
        }
    }
}
