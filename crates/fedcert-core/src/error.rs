//! Error types for federation keys and statements

use thiserror::Error;

/// Result type alias using FederationError
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors that can occur while managing keys or building, signing and
/// verifying entity statements
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FederationError {
    /// Identifier is not an https URL
    #[error("Invalid entity identifier '{0}'")]
    InvalidIdentifier(String),

    /// Key generation failed (entropy source or encoding failure)
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Two keys in one key set share a key ID
    #[error("Duplicate key ID in key set: {0}")]
    DuplicateKeyId(String),

    /// Key set does not hold exactly one federation key
    #[error("Expected exactly one federation key, found {0}")]
    FederationKeyCount(usize),

    /// Signing key has no key ID
    #[error("Signing key has no key ID")]
    MissingKeyId,

    /// Key used outside its purpose (federation vs certifiable)
    #[error("Key {kid} is a {actual} key, expected a {expected} key")]
    WrongKeyPurpose {
        kid: String,
        expected: String,
        actual: String,
    },

    /// Key has no private component
    #[error("Key {0} has no private component")]
    MissingPrivateKey(String),

    /// Claims could not be assembled into a statement
    #[error("Statement construction failed: {0}")]
    StatementConstruction(String),

    /// Signature creation failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Statement or JWS is malformed
    #[error("Malformed statement: {0}")]
    Malformed(String),

    /// Entity Configuration whose issuer and subject differ
    #[error("Statement is not self-issued: iss '{iss}', sub '{sub}'")]
    NotSelfIssued { iss: String, sub: String },

    /// Header `typ` is not the expected value
    #[error("Unexpected statement type: expected '{expected}', got '{actual}'")]
    UnexpectedType { expected: String, actual: String },

    /// No key with the header's `kid` in the verifying key set
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Header algorithm does not match the selected key
    #[error("Algorithm mismatch for key {kid}: header says {header}, key uses {key}")]
    AlgorithmMismatch {
        kid: String,
        header: String,
        key: String,
    },

    /// Signature verification failed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Statement expired
    #[error("Statement expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },

    /// Statement issued in the future
    #[error("Statement issued at {iat}, after now ({now})")]
    IssuedInFuture { iat: i64, now: i64 },

    /// JWK is malformed or its kid does not match its thumbprint
    #[error("Invalid JWK: {0}")]
    InvalidJwk(String),

    /// Key type or algorithm not supported
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for FederationError {
    fn from(err: base64::DecodeError) -> Self {
        FederationError::Malformed(format!("invalid base64url: {}", err))
    }
}

impl From<rsa::Error> for FederationError {
    fn from(err: rsa::Error) -> Self {
        FederationError::KeyGeneration(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for FederationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature => FederationError::InvalidSignature(err.to_string()),
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => FederationError::Malformed(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                FederationError::InvalidJwk(err.to_string())
            }
            _ => FederationError::Signing(err.to_string()),
        }
    }
}
