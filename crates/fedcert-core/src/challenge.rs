//! Challenge proof-of-possession signatures
//!
//! The response to an `openid-federation-01` challenge is a compact JWS whose
//! payload is the literal challenge token bytes, signed by a certifiable key.
//! The header carries only `alg` and `kid`.

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};
use crate::jwk::JwkSet;
use crate::jws::{sign_compact, CompactJws};
use crate::keys::{KeyPair, KeyPurpose};

/// ACME identifier type for federation entities
pub const IDENTIFIER_TYPE: &str = "openid-federation";

/// ACME challenge type
pub const CHALLENGE_TYPE: &str = "openid-federation-01";

/// Payload posted back to the CA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Compact JWS over the challenge token
    pub sig: String,
    /// Compact statements from leaf to trust anchor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_chain: Option<Vec<String>>,
}

impl ChallengeResponse {
    pub fn new(sig: String) -> Self {
        Self {
            sig,
            trust_chain: None,
        }
    }

    pub fn with_trust_chain(mut self, chain: Vec<String>) -> Self {
        self.trust_chain = Some(chain);
        self
    }
}

/// Sign a challenge token with a certifiable key
pub fn sign_challenge(token: &str, key: &KeyPair) -> Result<String> {
    key.ensure_purpose(KeyPurpose::Certifiable)?;
    if token.is_empty() {
        return Err(FederationError::Malformed("empty challenge token".into()));
    }
    sign_compact(None, token.as_bytes(), key)
}

/// Verify a challenge signature against the requestor's certifiable keys
///
/// Returns the kid of the key that signed.
pub fn verify_challenge_signature(sig: &str, token: &str, keys: &JwkSet) -> Result<String> {
    let jws = CompactJws::parse(sig)?;
    if jws.payload() != token.as_bytes() {
        return Err(FederationError::InvalidSignature(
            "signed payload is not the challenge token".into(),
        ));
    }

    let kid = jws.kid()?.to_string();
    let jwk = keys
        .find(&kid)
        .ok_or_else(|| FederationError::KeyNotFound(kid.clone()))?;
    let key = KeyPair::from_jwk(KeyPurpose::Certifiable, jwk)?;
    jws.verify(&key)?;

    Ok(kid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyAlgorithm;

    fn certifiable(algorithm: KeyAlgorithm) -> KeyPair {
        KeyPair::generate(KeyPurpose::Certifiable, algorithm).unwrap()
    }

    #[test]
    fn test_sign_and_verify_ec() {
        let key = certifiable(KeyAlgorithm::EcP256);
        let jwks = JwkSet::new(vec![key.to_jwk()]).unwrap();

        let sig = sign_challenge("tok-123", &key).unwrap();
        assert_eq!(verify_challenge_signature(&sig, "tok-123", &jwks).unwrap(), key.kid());
    }

    #[test]
    fn test_sign_and_verify_rsa() {
        let key = certifiable(KeyAlgorithm::Rsa2048);
        let jwks = JwkSet::new(vec![key.to_jwk()]).unwrap();

        let sig = sign_challenge("tok-rsa", &key).unwrap();
        assert!(verify_challenge_signature(&sig, "tok-rsa", &jwks).is_ok());
    }

    #[test]
    fn test_payload_is_literal_token() {
        let key = certifiable(KeyAlgorithm::EcP256);
        let sig = sign_challenge("literal-token", &key).unwrap();

        let jws = CompactJws::parse(&sig).unwrap();
        assert_eq!(jws.payload(), b"literal-token");
        assert_eq!(jws.kid().unwrap(), key.kid());
        assert!(jws.header().typ.is_none());
    }

    #[test]
    fn test_federation_key_refused() {
        let key = KeyPair::generate(KeyPurpose::Federation, KeyAlgorithm::EcP256).unwrap();
        assert!(matches!(
            sign_challenge("tok", &key),
            Err(FederationError::WrongKeyPurpose { .. })
        ));
    }

    #[test]
    fn test_other_token_rejected() {
        let key = certifiable(KeyAlgorithm::EcP256);
        let jwks = JwkSet::new(vec![key.to_jwk()]).unwrap();

        let sig = sign_challenge("tok-a", &key).unwrap();
        assert!(matches!(
            verify_challenge_signature(&sig, "tok-b", &jwks),
            Err(FederationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let key = certifiable(KeyAlgorithm::EcP256);
        let other = certifiable(KeyAlgorithm::EcP256);
        let jwks = JwkSet::new(vec![other.to_jwk()]).unwrap();

        let sig = sign_challenge("tok", &key).unwrap();
        assert!(matches!(
            verify_challenge_signature(&sig, "tok", &jwks),
            Err(FederationError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_response_wire_shape() {
        let response = ChallengeResponse::new("a.b.c".into());
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"sig":"a.b.c"}"#);

        let with_chain = response.with_trust_chain(vec!["x.y.z".into()]);
        let json = serde_json::to_value(&with_chain).unwrap();
        assert_eq!(json["trust_chain"][0], "x.y.z");

        let parsed: ChallengeResponse = serde_json::from_str(r#"{"sig":"s"}"#).unwrap();
        assert!(parsed.trust_chain.is_none());
    }
}
