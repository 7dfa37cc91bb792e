//! Entity key material
//!
//! Every entity holds two disjoint key sets:
//! - **Federation keys** sign the entity's own statements (exactly one)
//! - **Certifiable keys** are the keys the entity asks a CA to certify; they
//!   only ever sign ACME challenge tokens
//!
//! Key types:
//! - `KeyPair`: one RSA-2048 or EC-P256 key, private part optional
//! - `KeySet`: keys of one purpose, unique by key ID
//! - `KeyRing`: the federation and certifiable sets of one entity
//!
//! Key IDs are RFC 7638 thumbprints computed when the key is constructed, so
//! a key is never observable without one.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::error::{FederationError, Result};
use crate::jwk::{Jwk, JwkSet};

const RSA_BITS: usize = 2048;
const P256_CURVE: &str = "P-256";

/// Supported key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSA 2048 bit, signs with RS256
    #[serde(rename = "RSA-2048")]
    Rsa2048,
    /// ECDSA on P-256, signs with ES256
    #[serde(rename = "EC-P256")]
    EcP256,
}

impl KeyAlgorithm {
    /// Algorithm tag ("RSA-2048" / "EC-P256")
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "RSA-2048",
            KeyAlgorithm::EcP256 => "EC-P256",
        }
    }

    /// JWS algorithm used by keys of this type
    pub fn jws_algorithm(&self) -> Algorithm {
        match self {
            KeyAlgorithm::Rsa2048 => Algorithm::RS256,
            KeyAlgorithm::EcP256 => Algorithm::ES256,
        }
    }

    /// JWS algorithm name as it appears in JWK `alg` members
    pub fn jws_name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "RS256",
            KeyAlgorithm::EcP256 => "ES256",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RSA-2048" | "RSA2048" | "RS256" => Ok(KeyAlgorithm::Rsa2048),
            "EC-P256" | "P256" | "P-256" | "ES256" => Ok(KeyAlgorithm::EcP256),
            _ => Err(FederationError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// What a key is allowed to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPurpose {
    /// Signs Entity Configurations and Subordinate Statements
    Federation,
    /// Signs ACME challenge tokens as proof of possession
    Certifiable,
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPurpose::Federation => write!(f, "federation"),
            KeyPurpose::Certifiable => write!(f, "certifiable"),
        }
    }
}

#[derive(Clone)]
enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ec(p256::SecretKey),
}

/// Asymmetric key with a thumbprint key ID
///
/// The private component is present only on keys the local entity owns.
/// Keys rebuilt from a peer's JWKS are public-only.
#[derive(Clone)]
pub struct KeyPair {
    purpose: KeyPurpose,
    algorithm: KeyAlgorithm,
    /// Public JWK, carries the kid
    jwk: Jwk,
    private: Option<PrivateKey>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.jwk.kid)
            .field("algorithm", &self.algorithm)
            .field("purpose", &self.purpose)
            .field("private", &self.private.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key
    pub fn generate(purpose: KeyPurpose, algorithm: KeyAlgorithm) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Rsa2048 => {
                let private_key = RsaPrivateKey::new(&mut OsRng, RSA_BITS)?;
                Self::from_rsa_private_key(purpose, private_key)
            }
            KeyAlgorithm::EcP256 => {
                let secret_key = p256::SecretKey::random(&mut OsRng);
                Self::from_ec_secret_key(purpose, secret_key)
            }
        }
    }

    /// Wrap an existing RSA private key
    pub fn from_rsa_private_key(purpose: KeyPurpose, private_key: RsaPrivateKey) -> Result<Self> {
        let jwk = rsa_jwk(&private_key.to_public_key())?;
        Ok(Self {
            purpose,
            algorithm: KeyAlgorithm::Rsa2048,
            jwk,
            private: Some(PrivateKey::Rsa(private_key)),
        })
    }

    /// Wrap an existing P-256 secret key
    pub fn from_ec_secret_key(purpose: KeyPurpose, secret_key: p256::SecretKey) -> Result<Self> {
        let jwk = ec_jwk(&secret_key.public_key())?;
        Ok(Self {
            purpose,
            algorithm: KeyAlgorithm::EcP256,
            jwk,
            private: Some(PrivateKey::Ec(secret_key)),
        })
    }

    /// Rebuild a public-only key from a JWK published by a peer
    ///
    /// The key material is parsed (not just copied) and the advertised kid
    /// must equal the recomputed thumbprint.
    pub fn from_jwk(purpose: KeyPurpose, jwk: &Jwk) -> Result<Self> {
        jwk.verify_kid()?;

        let algorithm = match jwk.kty.as_str() {
            "RSA" => {
                let n = decode_member(&jwk.n, "n")?;
                let e = decode_member(&jwk.e, "e")?;
                let public_key =
                    RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
                        .map_err(|e| FederationError::InvalidJwk(e.to_string()))?;
                if public_key.size() * 8 != RSA_BITS {
                    return Err(FederationError::UnsupportedAlgorithm(format!(
                        "RSA key of {} bits",
                        public_key.size() * 8
                    )));
                }
                KeyAlgorithm::Rsa2048
            }
            "EC" => {
                if jwk.crv.as_deref() != Some(P256_CURVE) {
                    return Err(FederationError::UnsupportedAlgorithm(format!(
                        "EC curve {:?}",
                        jwk.crv
                    )));
                }
                let x = decode_member(&jwk.x, "x")?;
                let y = decode_member(&jwk.y, "y")?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(FederationError::InvalidJwk(
                        "P-256 coordinates must be 32 bytes".into(),
                    ));
                }
                let mut sec1 = Vec::with_capacity(65);
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                p256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|_| FederationError::InvalidJwk("point not on P-256".into()))?;
                KeyAlgorithm::EcP256
            }
            other => {
                return Err(FederationError::UnsupportedAlgorithm(format!(
                    "key type {}",
                    other
                )))
            }
        };

        if let Some(alg) = jwk.alg.as_deref() {
            if alg != algorithm.jws_name() {
                return Err(FederationError::AlgorithmMismatch {
                    kid: jwk.kid.clone(),
                    header: alg.to_string(),
                    key: algorithm.jws_name().to_string(),
                });
            }
        }

        Ok(Self {
            purpose,
            algorithm,
            jwk: jwk.clone(),
            private: None,
        })
    }

    /// Key ID (RFC 7638 thumbprint)
    pub fn kid(&self) -> &str {
        &self.jwk.kid
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    /// Whether this key carries its private component
    pub fn is_private(&self) -> bool {
        self.private.is_some()
    }

    /// Public JWK of this key
    pub fn to_jwk(&self) -> Jwk {
        self.jwk.clone()
    }

    /// Copy of this key without the private component
    pub fn to_public(&self) -> KeyPair {
        KeyPair {
            purpose: self.purpose,
            algorithm: self.algorithm,
            jwk: self.jwk.clone(),
            private: None,
        }
    }

    /// Check the key may be used for `purpose`
    pub fn ensure_purpose(&self, purpose: KeyPurpose) -> Result<()> {
        if self.purpose != purpose {
            return Err(FederationError::WrongKeyPurpose {
                kid: self.kid().to_string(),
                expected: purpose.to_string(),
                actual: self.purpose.to_string(),
            });
        }
        Ok(())
    }

    /// Signing key for jsonwebtoken
    pub(crate) fn encoding_key(&self) -> Result<EncodingKey> {
        match &self.private {
            Some(PrivateKey::Rsa(key)) => {
                let der = key
                    .to_pkcs1_der()
                    .map_err(|e| FederationError::Signing(e.to_string()))?;
                Ok(EncodingKey::from_rsa_der(der.as_bytes()))
            }
            Some(PrivateKey::Ec(key)) => {
                let der = key
                    .to_pkcs8_der()
                    .map_err(|e| FederationError::Signing(e.to_string()))?;
                Ok(EncodingKey::from_ec_der(der.as_bytes()))
            }
            None => Err(FederationError::MissingPrivateKey(self.kid().to_string())),
        }
    }

    /// Verification key for jsonwebtoken
    pub(crate) fn decoding_key(&self) -> Result<DecodingKey> {
        match self.algorithm {
            KeyAlgorithm::Rsa2048 => {
                let n = required_member(&self.jwk.n, "n")?;
                let e = required_member(&self.jwk.e, "e")?;
                Ok(DecodingKey::from_rsa_components(n, e)?)
            }
            KeyAlgorithm::EcP256 => {
                let x = required_member(&self.jwk.x, "x")?;
                let y = required_member(&self.jwk.y, "y")?;
                Ok(DecodingKey::from_ec_components(x, y)?)
            }
        }
    }
}

fn rsa_jwk(public_key: &RsaPublicKey) -> Result<Jwk> {
    if public_key.size() * 8 != RSA_BITS {
        return Err(FederationError::KeyGeneration(format!(
            "expected a {} bit RSA key, got {} bits",
            RSA_BITS,
            public_key.size() * 8
        )));
    }
    Jwk::rsa(
        URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        KeyAlgorithm::Rsa2048.jws_name(),
    )
}

fn ec_jwk(public_key: &p256::PublicKey) -> Result<Jwk> {
    let point = public_key.to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| FederationError::KeyGeneration("P-256 point has no x coordinate".into()))?;
    let y = point
        .y()
        .ok_or_else(|| FederationError::KeyGeneration("P-256 point has no y coordinate".into()))?;
    Jwk::ec(
        P256_CURVE,
        URL_SAFE_NO_PAD.encode(x),
        URL_SAFE_NO_PAD.encode(y),
        KeyAlgorithm::EcP256.jws_name(),
    )
}

fn required_member<'a>(member: &'a Option<String>, name: &str) -> Result<&'a str> {
    member
        .as_deref()
        .ok_or_else(|| FederationError::InvalidJwk(format!("missing member '{}'", name)))
}

fn decode_member(member: &Option<String>, name: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(required_member(member, name)?)
        .map_err(|e| FederationError::InvalidJwk(format!("member '{}': {}", name, e)))
}

/// Ordered set of keys sharing one purpose
#[derive(Debug, Clone)]
pub struct KeySet {
    purpose: KeyPurpose,
    keys: Vec<KeyPair>,
}

impl KeySet {
    /// Create an empty key set
    pub fn new(purpose: KeyPurpose) -> Self {
        Self {
            purpose,
            keys: Vec::new(),
        }
    }

    /// Rebuild a public-only key set from a peer's JWKS
    pub fn from_jwks(purpose: KeyPurpose, jwks: &JwkSet) -> Result<Self> {
        let mut set = Self::new(purpose);
        for jwk in &jwks.keys {
            set.insert(KeyPair::from_jwk(purpose, jwk)?)?;
        }
        Ok(set)
    }

    /// Add a key, enforcing purpose and kid uniqueness
    pub fn insert(&mut self, key: KeyPair) -> Result<()> {
        key.ensure_purpose(self.purpose)?;
        if key.kid().is_empty() {
            return Err(FederationError::MissingKeyId);
        }
        if self.get(key.kid()).is_some() {
            return Err(FederationError::DuplicateKeyId(key.kid().to_string()));
        }
        self.keys.push(key);
        Ok(())
    }

    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    /// Get a key by kid
    pub fn get(&self, kid: &str) -> Option<&KeyPair> {
        self.keys.iter().find(|k| k.kid() == kid)
    }

    /// First key of the given algorithm
    pub fn by_algorithm(&self, algorithm: KeyAlgorithm) -> Option<&KeyPair> {
        self.keys.iter().find(|k| k.algorithm() == algorithm)
    }

    pub fn first(&self) -> Option<&KeyPair> {
        self.keys.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyPair> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Copy of this set with every private component stripped
    pub fn public(&self) -> KeySet {
        KeySet {
            purpose: self.purpose,
            keys: self.keys.iter().map(KeyPair::to_public).collect(),
        }
    }

    /// Public JWKS representation
    pub fn to_jwks(&self) -> JwkSet {
        JwkSet {
            keys: self.keys.iter().map(KeyPair::to_jwk).collect(),
        }
    }
}

/// Key material of one entity
#[derive(Debug, Clone)]
pub struct KeyRing {
    federation: KeySet,
    certifiable: KeySet,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRing {
    /// Create an empty key ring
    pub fn new() -> Self {
        Self {
            federation: KeySet::new(KeyPurpose::Federation),
            certifiable: KeySet::new(KeyPurpose::Certifiable),
        }
    }

    /// Generate a key and add it to the set for `purpose`
    pub fn generate(&mut self, purpose: KeyPurpose, algorithm: KeyAlgorithm) -> Result<&KeyPair> {
        let key = KeyPair::generate(purpose, algorithm)?;
        let kid = key.kid().to_string();

        let set = self.set_mut(purpose);
        set.insert(key)?;

        info!(kid = %kid, algorithm = %algorithm, purpose = %purpose, "Generated key");

        set.get(&kid)
            .ok_or(FederationError::KeyGeneration("generated key missing from set".into()))
    }

    /// Add an existing key to the set matching its purpose
    pub fn insert(&mut self, key: KeyPair) -> Result<()> {
        self.set_mut(key.purpose()).insert(key)
    }

    /// Keys for `purpose` without private components
    pub fn public_key_set(&self, purpose: KeyPurpose) -> KeySet {
        self.private_key_set(purpose).public()
    }

    /// Keys for `purpose`, including private components
    pub fn private_key_set(&self, purpose: KeyPurpose) -> &KeySet {
        match purpose {
            KeyPurpose::Federation => &self.federation,
            KeyPurpose::Certifiable => &self.certifiable,
        }
    }

    /// The single federation signing key
    pub fn federation_key(&self) -> Result<&KeyPair> {
        match self.federation.len() {
            1 => self
                .federation
                .first()
                .ok_or(FederationError::FederationKeyCount(0)),
            n => Err(FederationError::FederationKeyCount(n)),
        }
    }

    fn set_mut(&mut self, purpose: KeyPurpose) -> &mut KeySet {
        match purpose {
            KeyPurpose::Federation => &mut self.federation,
            KeyPurpose::Certifiable => &mut self.certifiable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec_key_generation() {
        let kp = KeyPair::generate(KeyPurpose::Certifiable, KeyAlgorithm::EcP256).unwrap();
        assert_eq!(kp.algorithm(), KeyAlgorithm::EcP256);
        assert!(kp.is_private());
        assert_eq!(kp.kid().len(), 43);

        let jwk = kp.to_jwk();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert_eq!(jwk.alg.as_deref(), Some("ES256"));
        assert_eq!(jwk.kid, jwk.thumbprint().unwrap());
    }

    #[test]
    fn test_rsa_key_generation() {
        let kp = KeyPair::generate(KeyPurpose::Federation, KeyAlgorithm::Rsa2048).unwrap();
        assert_eq!(kp.algorithm(), KeyAlgorithm::Rsa2048);

        let jwk = kp.to_jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        assert_eq!(jwk.kid, jwk.thumbprint().unwrap());
    }

    #[test]
    fn test_public_projection() {
        let kp = KeyPair::generate(KeyPurpose::Federation, KeyAlgorithm::EcP256).unwrap();
        let public = kp.to_public();

        assert!(!public.is_private());
        assert_eq!(public.kid(), kp.kid());
        assert!(matches!(
            public.encoding_key(),
            Err(FederationError::MissingPrivateKey(_))
        ));
    }

    #[test]
    fn test_from_jwk_roundtrip() {
        let kp = KeyPair::generate(KeyPurpose::Federation, KeyAlgorithm::EcP256).unwrap();
        let restored = KeyPair::from_jwk(KeyPurpose::Federation, &kp.to_jwk()).unwrap();

        assert_eq!(restored.kid(), kp.kid());
        assert_eq!(restored.algorithm(), KeyAlgorithm::EcP256);
        assert!(!restored.is_private());
    }

    #[test]
    fn test_from_jwk_rejects_wrong_alg() {
        let kp = KeyPair::generate(KeyPurpose::Federation, KeyAlgorithm::EcP256).unwrap();
        let mut jwk = kp.to_jwk();
        jwk.alg = Some("RS256".into());

        assert!(matches!(
            KeyPair::from_jwk(KeyPurpose::Federation, &jwk),
            Err(FederationError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_from_jwk_rejects_invalid_point() {
        let kp = KeyPair::generate(KeyPurpose::Federation, KeyAlgorithm::EcP256).unwrap();
        let mut jwk = kp.to_jwk();
        jwk.y = Some(URL_SAFE_NO_PAD.encode([0u8; 32]));
        jwk.kid = jwk.thumbprint().unwrap();

        assert!(KeyPair::from_jwk(KeyPurpose::Federation, &jwk).is_err());
    }

    #[test]
    fn test_key_set_rejects_duplicates_and_wrong_purpose() {
        let kp = KeyPair::generate(KeyPurpose::Certifiable, KeyAlgorithm::EcP256).unwrap();

        let mut set = KeySet::new(KeyPurpose::Certifiable);
        set.insert(kp.clone()).unwrap();
        assert!(matches!(
            set.insert(kp.clone()),
            Err(FederationError::DuplicateKeyId(_))
        ));

        let mut federation = KeySet::new(KeyPurpose::Federation);
        assert!(matches!(
            federation.insert(kp),
            Err(FederationError::WrongKeyPurpose { .. })
        ));
    }

    #[test]
    fn test_key_ring_sets_are_disjoint() {
        let mut ring = KeyRing::new();
        let fed_kid = ring
            .generate(KeyPurpose::Federation, KeyAlgorithm::EcP256)
            .unwrap()
            .kid()
            .to_string();
        ring.generate(KeyPurpose::Certifiable, KeyAlgorithm::EcP256)
            .unwrap();

        let federation = ring.public_key_set(KeyPurpose::Federation);
        let certifiable = ring.public_key_set(KeyPurpose::Certifiable);

        assert_eq!(federation.len(), 1);
        assert_eq!(certifiable.len(), 1);
        assert!(certifiable.get(&fed_kid).is_none());
        assert!(federation.iter().all(|k| !k.is_private()));
        assert!(ring
            .private_key_set(KeyPurpose::Federation)
            .iter()
            .all(|k| k.is_private()));
    }

    #[test]
    fn test_federation_key_count() {
        let mut ring = KeyRing::new();
        assert!(matches!(
            ring.federation_key(),
            Err(FederationError::FederationKeyCount(0))
        ));

        ring.generate(KeyPurpose::Federation, KeyAlgorithm::EcP256)
            .unwrap();
        assert!(ring.federation_key().is_ok());

        ring.generate(KeyPurpose::Federation, KeyAlgorithm::EcP256)
            .unwrap();
        assert!(matches!(
            ring.federation_key(),
            Err(FederationError::FederationKeyCount(2))
        ));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("RSA-2048".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rsa2048);
        assert_eq!("ec-p256".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EcP256);
        assert_eq!("ES256".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EcP256);
        assert!("Ed25519".parse::<KeyAlgorithm>().is_err());
    }
}
