//! JSON Web Keys and key sets
//!
//! Public keys travel between entities as RFC 7517 JWKs. The `kid` of every
//! key is its RFC 7638 thumbprint:
//!
//! 1. Canonical JSON of the required members in lexicographic order
//!    - RSA: `{"e":"..","kty":"RSA","n":".."}`
//!    - EC:  `{"crv":"P-256","kty":"EC","x":"..","y":".."}`
//! 2. SHA-256 of that JSON
//! 3. base64url without padding
//!
//! Only public members are modelled here. Private key material never has a
//! JWK representation in this crate.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FederationError, Result};

/// Public JSON Web Key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,
    /// Key ID (RFC 7638 thumbprint)
    pub kid: String,
    /// JWS algorithm this key is used with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Public key use
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC curve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Build an RSA JWK from base64url modulus and exponent, deriving the kid
    pub fn rsa(n: String, e: String, alg: &str) -> Result<Self> {
        let mut jwk = Self {
            kty: "RSA".to_string(),
            kid: String::new(),
            alg: Some(alg.to_string()),
            key_use: Some("sig".to_string()),
            n: Some(n),
            e: Some(e),
            crv: None,
            x: None,
            y: None,
        };
        jwk.kid = jwk.thumbprint()?;
        Ok(jwk)
    }

    /// Build an EC JWK from base64url coordinates, deriving the kid
    pub fn ec(crv: &str, x: String, y: String, alg: &str) -> Result<Self> {
        let mut jwk = Self {
            kty: "EC".to_string(),
            kid: String::new(),
            alg: Some(alg.to_string()),
            key_use: Some("sig".to_string()),
            n: None,
            e: None,
            crv: Some(crv.to_string()),
            x: Some(x),
            y: Some(y),
        };
        jwk.kid = jwk.thumbprint()?;
        Ok(jwk)
    }

    /// Compute the RFC 7638 thumbprint of this key
    ///
    /// Depends only on the required public members, never on `kid`, `alg`
    /// or `use`.
    pub fn thumbprint(&self) -> Result<String> {
        let canonical = match self.kty.as_str() {
            "RSA" => format!(
                r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
                required(&self.e, "e")?,
                required(&self.n, "n")?,
            ),
            "EC" => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                required(&self.crv, "crv")?,
                required(&self.x, "x")?,
                required(&self.y, "y")?,
            ),
            other => {
                return Err(FederationError::UnsupportedAlgorithm(format!(
                    "key type {}",
                    other
                )))
            }
        };

        let digest = Sha256::digest(canonical.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Check that the advertised kid equals the recomputed thumbprint
    pub fn verify_kid(&self) -> Result<()> {
        let expected = self.thumbprint()?;
        if self.kid != expected {
            return Err(FederationError::InvalidJwk(format!(
                "kid '{}' does not match thumbprint '{}'",
                self.kid, expected
            )));
        }
        Ok(())
    }
}

fn required<'a>(member: &'a Option<String>, name: &str) -> Result<&'a str> {
    let value = member
        .as_deref()
        .ok_or_else(|| FederationError::InvalidJwk(format!("missing member '{}'", name)))?;

    // Members are base64url (or a curve name); anything that would need
    // JSON escaping cannot be canonicalized by plain formatting.
    if value.is_empty() || value.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        return Err(FederationError::InvalidJwk(format!(
            "member '{}' is not a valid base64url value",
            name
        )));
    }
    Ok(value)
}

/// JSON Web Key Set
///
/// Serialized as `{"keys": [...]}`. Deserialization rejects sets containing
/// a key without a `kid` or two keys with the same `kid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Create a key set, checking kid uniqueness
    pub fn new(keys: Vec<Jwk>) -> Result<Self> {
        for (i, key) in keys.iter().enumerate() {
            if key.kid.is_empty() {
                return Err(FederationError::MissingKeyId);
            }
            if keys[..i].iter().any(|k| k.kid == key.kid) {
                return Err(FederationError::DuplicateKeyId(key.kid.clone()));
            }
        }
        Ok(Self { keys })
    }

    /// Find a key by kid
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Check if a kid is present
    pub fn contains(&self, kid: &str) -> bool {
        self.find(kid).is_some()
    }

    /// Key IDs in set order
    pub fn kids(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.kid.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<'de> Deserialize<'de> for JwkSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawJwkSet {
            keys: Vec<Jwk>,
        }

        let raw = RawJwkSet::deserialize(deserializer)?;
        JwkSet::new(raw.keys).map_err(serde::de::Error::custom)
    }
}
