//! Compact JWS serialization
//!
//! Entity statements carry a JSON payload, challenge signatures carry the raw
//! token bytes, so signing works on arbitrary payload bytes rather than going
//! through `jsonwebtoken::encode`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{crypto, Header};

use crate::error::{FederationError, Result};
use crate::keys::KeyPair;

/// Sign `payload` with `key`, producing `header.payload.signature`
///
/// The header carries `alg` from the key, the key's `kid`, and `typ` when
/// given.
pub fn sign_compact(typ: Option<&str>, payload: &[u8], key: &KeyPair) -> Result<String> {
    if key.kid().is_empty() {
        return Err(FederationError::MissingKeyId);
    }

    let algorithm = key.algorithm().jws_algorithm();
    let mut header = Header::new(algorithm);
    header.typ = typ.map(str::to_string);
    header.kid = Some(key.kid().to_string());

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = crypto::sign(signing_input.as_bytes(), &key.encoding_key()?, algorithm)?;

    Ok(format!("{}.{}", signing_input, signature))
}

/// Parsed, not yet verified, compact JWS
#[derive(Debug, Clone)]
pub struct CompactJws {
    header: Header,
    payload: Vec<u8>,
    signing_input: String,
    signature: String,
}

impl CompactJws {
    /// Split and decode a compact JWS
    pub fn parse(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(FederationError::Malformed(
                "expected three non-empty dot-separated parts".into(),
            ));
        }

        let header = jsonwebtoken::decode_header(token)?;
        let payload = URL_SAFE_NO_PAD.decode(parts[1])?;

        Ok(Self {
            header,
            payload,
            signing_input: format!("{}.{}", parts[0], parts[1]),
            signature: parts[2].to_string(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header `kid`, required for every signature in this system
    pub fn kid(&self) -> Result<&str> {
        match self.header.kid.as_deref() {
            Some(kid) if !kid.is_empty() => Ok(kid),
            _ => Err(FederationError::MissingKeyId),
        }
    }

    /// Verify the signature with `key`
    ///
    /// The key must be the one named by the header `kid`, and the header
    /// algorithm must be the key's algorithm.
    pub fn verify(&self, key: &KeyPair) -> Result<()> {
        let kid = self.kid()?;
        if kid != key.kid() {
            return Err(FederationError::KeyNotFound(kid.to_string()));
        }

        let expected = key.algorithm().jws_algorithm();
        if self.header.alg != expected {
            return Err(FederationError::AlgorithmMismatch {
                kid: kid.to_string(),
                header: format!("{:?}", self.header.alg),
                key: key.algorithm().jws_name().to_string(),
            });
        }

        let valid = crypto::verify(
            &self.signature,
            self.signing_input.as_bytes(),
            &key.decoding_key()?,
            expected,
        )?;
        if !valid {
            return Err(FederationError::InvalidSignature(format!(
                "signature does not verify under key {}",
                kid
            )));
        }
        Ok(())
    }
}
