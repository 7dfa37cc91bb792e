//! CA-side verification of challenge responses
//!
//! Trust comes first: the requestor's chain is resolved to one of the CA's
//! trust anchors, and only then is its `acme_requestor` key set used to
//! check the signature over the token.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use fedcert_core::{
    metadata_type, verify_challenge_signature, AcmeRequestorMetadata, ChallengeResponse,
    EntityId, CHALLENGE_TYPE,
};
use fedcert_trust::{
    FederationGraph, MemoryFetcher, ResolverConfig, TrustChain, TrustChainResolver,
};
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, warn};

use crate::challenge::{AcmeValidator, Challenge, Identifier};
use crate::error::{PlaneError, Result};

/// Random challenge token, 256 bits of entropy, base64url without padding
pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Check a challenge response against an already verified trust chain
///
/// Returns the kid of the certifiable key that signed the token.
pub fn verify_challenge_response(
    chain: &TrustChain,
    identifier: &EntityId,
    token: &str,
    response: &ChallengeResponse,
) -> Result<String> {
    let leaf = chain
        .leaf()
        .ok_or_else(|| PlaneError::Validation("empty trust chain".into()))?;
    if leaf.entity_id() != identifier {
        return Err(PlaneError::Validation(format!(
            "trust chain is for {}, not {}",
            leaf.entity_id(),
            identifier
        )));
    }

    let requestor: AcmeRequestorMetadata =
        chain.find_typed_metadata(metadata_type::ACME_REQUESTOR)?;
    if &requestor.sub != identifier {
        return Err(PlaneError::Validation(format!(
            "acme_requestor metadata is for {}, not {}",
            requestor.sub, identifier
        )));
    }

    Ok(verify_challenge_signature(
        &response.sig,
        token,
        &requestor.jwks,
    )?)
}

/// Validator resolving the requestor's trust chain before checking the
/// signature
///
/// An attached `trust_chain` is resolved from its own statements and must
/// end at an anchor whose keys are pinned in the validator's graph. Without
/// one the validator falls back to its resolver, if it has one, which may
/// trust unpinned anchors since it fetches their configurations itself.
pub struct ChainValidator {
    graph: Arc<FederationGraph>,
    config: ResolverConfig,
    resolver: Option<Arc<TrustChainResolver>>,
}

impl ChainValidator {
    /// Accept chains ending at the trust anchors declared in `graph`
    pub fn new(graph: Arc<FederationGraph>) -> Self {
        Self {
            graph,
            config: ResolverConfig::default(),
            resolver: None,
        }
    }

    /// Resolve requestors that attach no chain with `resolver`
    pub fn with_resolver(mut self, resolver: Arc<TrustChainResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    async fn resolve(&self, id: &EntityId, response: &ChallengeResponse) -> Result<TrustChain> {
        match (&response.trust_chain, &self.resolver) {
            (Some(statements), _) => {
                let fetcher = MemoryFetcher::from_statements(statements)?;
                let resolver = TrustChainResolver::with_config(
                    Arc::new(fetcher),
                    self.graph.clone(),
                    self.config.clone(),
                );
                let chain = resolver.resolve(id).await?;

                // The anchor configuration came from the requestor too
                let anchor = chain
                    .trust_anchor()
                    .ok_or_else(|| PlaneError::Validation("empty trust chain".into()))?
                    .entity_id();
                if self.graph.trust_anchor_keys(anchor).is_none() {
                    return Err(PlaneError::UnpinnedTrustAnchor(anchor.to_string()));
                }
                Ok(chain)
            }
            (None, Some(resolver)) => Ok(resolver.resolve(id).await?),
            (None, None) => Err(PlaneError::Validation(
                "no trust chain attached and no resolver configured".into(),
            )),
        }
    }
}

#[async_trait]
impl AcmeValidator for ChainValidator {
    async fn validate(
        &self,
        identifier: &Identifier,
        challenge: &Challenge,
        response: &ChallengeResponse,
    ) -> Result<()> {
        let id = identifier.entity_id()?;
        if challenge.kind != CHALLENGE_TYPE {
            return Err(PlaneError::Validation(format!(
                "unexpected challenge type '{}'",
                challenge.kind
            )));
        }

        let chain = self.resolve(&id, response).await.map_err(|e| {
            warn!(identifier = %id, error = %e, "Requestor trust chain rejected");
            e
        })?;
        let kid = verify_challenge_response(&chain, &id, &challenge.token, response)?;

        info!(
            identifier = %id,
            kid = %kid,
            anchor = %chain.trust_anchor().map(|l| l.entity_id().as_str()).unwrap_or_default(),
            "Challenge validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_no_chain_and_no_resolver_rejected() {
        let validator = ChainValidator::new(Arc::new(FederationGraph::new()));
        let id = EntityId::parse("https://leaf.example").unwrap();

        let result = validator
            .validate(
                &Identifier::openid_federation(&id),
                &Challenge::openid_federation("abc", "https://ca.example/chall"),
                &ChallengeResponse::new("a.b.c".into()),
            )
            .await;
        assert!(matches!(result, Err(PlaneError::Validation(_))));
    }
}
