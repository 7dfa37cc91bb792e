//! ACME `openid-federation-01` challenge solving
//!
//! The solver picks the local entity whose identifier exactly matches the
//! authorization, signs the literal challenge token with one of that
//! entity's certifiable keys and optionally attaches the entity's trust
//! chain. It only reads key material; it never publishes or re-signs
//! statements.
//!
//! ## States
//!
//! `Idle → EntitySelected → TokenSigned → ResponseEmitted`, with
//! `EntityNotFound`, `SigningFailed` and `ChainUnavailable` as terminal
//! failures. `ChainUnavailable` is reachable only when the solver attaches
//! trust chains.

use async_trait::async_trait;
use fedcert_core::{
    sign_challenge, ChallengeResponse, Entity, EntityId, FederationError, KeyAlgorithm,
    CHALLENGE_TYPE, IDENTIFIER_TYPE,
};
use fedcert_trust::TrustChainResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PlaneError, Result};

/// Default budget for a solve-and-validate flow
pub const DEFAULT_SOLVE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ACME shapes
// =============================================================================

/// ACME identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    /// `openid-federation` identifier for an entity
    pub fn openid_federation(id: &EntityId) -> Self {
        Self {
            kind: IDENTIFIER_TYPE.into(),
            value: id.to_string(),
        }
    }

    /// Entity identifier, if this is an `openid-federation` identifier
    pub fn entity_id(&self) -> Result<EntityId> {
        if self.kind != IDENTIFIER_TYPE {
            return Err(PlaneError::UnsupportedIdentifier(self.kind.clone()));
        }
        Ok(EntityId::parse(self.value.as_str())?)
    }
}

/// ACME challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    pub token: String,
    pub url: String,
}

impl Challenge {
    pub fn openid_federation(token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: CHALLENGE_TYPE.into(),
            token: token.into(),
            url: url.into(),
        }
    }
}

/// ACME authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub challenges: Vec<Challenge>,
}

impl Authorization {
    /// The `openid-federation-01` challenge offered by this authorization
    pub fn federation_challenge(&self) -> Result<&Challenge> {
        self.challenges
            .iter()
            .find(|c| c.kind == CHALLENGE_TYPE)
            .ok_or_else(|| PlaneError::NoChallenge(self.identifier.value.clone()))
    }
}

/// CA-side validation of a challenge response
#[async_trait]
pub trait AcmeValidator: Send + Sync {
    async fn validate(
        &self,
        identifier: &Identifier,
        challenge: &Challenge,
        response: &ChallengeResponse,
    ) -> Result<()>;
}

// =============================================================================
// Solver
// =============================================================================

/// Progress of one solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Idle,
    EntitySelected,
    TokenSigned,
    ResponseEmitted,
    EntityNotFound,
    SigningFailed,
    ChainUnavailable,
}

impl SolverState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SolverState::ResponseEmitted
                | SolverState::EntityNotFound
                | SolverState::SigningFailed
                | SolverState::ChainUnavailable
        )
    }
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverState::Idle => "idle",
            SolverState::EntitySelected => "entity_selected",
            SolverState::TokenSigned => "token_signed",
            SolverState::ResponseEmitted => "response_emitted",
            SolverState::EntityNotFound => "entity_not_found",
            SolverState::SigningFailed => "signing_failed",
            SolverState::ChainUnavailable => "chain_unavailable",
        };
        f.write_str(name)
    }
}

struct Progress<'a> {
    identifier: &'a EntityId,
    state: SolverState,
}

impl<'a> Progress<'a> {
    fn start(identifier: &'a EntityId) -> Self {
        Self {
            identifier,
            state: SolverState::Idle,
        }
    }

    fn advance(&mut self, next: SolverState) {
        debug!(
            identifier = %self.identifier,
            from = %self.state,
            to = %next,
            "Solver state transition"
        );
        self.state = next;
    }
}

/// Solves `openid-federation-01` challenges for a fixed set of entities
pub struct ChallengeSolver {
    entities: Vec<Entity>,
    resolver: Option<Arc<TrustChainResolver>>,
    key_algorithm: Option<KeyAlgorithm>,
    timeout: Duration,
}

impl ChallengeSolver {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            resolver: None,
            key_algorithm: None,
            timeout: DEFAULT_SOLVE_TIMEOUT,
        }
    }

    /// Attach the requestor's resolved trust chain to every response
    pub fn with_trust_chain(mut self, resolver: Arc<TrustChainResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sign with the certifiable key of `algorithm` instead of the first one
    pub fn with_key_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.key_algorithm = Some(algorithm);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Sign `token` as the entity identified by `identifier`
    pub async fn solve(&self, identifier: &EntityId, token: &str) -> Result<ChallengeResponse> {
        let mut progress = Progress::start(identifier);
        self.solve_tracked(&mut progress, token).await
    }

    async fn solve_tracked(
        &self,
        progress: &mut Progress<'_>,
        token: &str,
    ) -> Result<ChallengeResponse> {
        let identifier = progress.identifier;

        let entity = match self.entities.iter().find(|e| e.id() == identifier) {
            Some(entity) => entity,
            None => {
                progress.advance(SolverState::EntityNotFound);
                warn!(identifier = %identifier, "No local entity for challenge");
                return Err(PlaneError::EntityNotFound(identifier.to_string()));
            }
        };
        progress.advance(SolverState::EntitySelected);

        let signed = entity
            .certifiable_key(self.key_algorithm)
            .ok_or_else(|| {
                FederationError::KeyNotFound(match self.key_algorithm {
                    Some(algorithm) => format!("no certifiable {} key", algorithm),
                    None => "no certifiable key".into(),
                })
            })
            .and_then(|key| Ok((key.kid().to_string(), sign_challenge(token, key)?)));

        let (kid, sig) = match signed {
            Ok(signed) => signed,
            Err(source) => {
                progress.advance(SolverState::SigningFailed);
                warn!(identifier = %identifier, error = %source, "Signing challenge failed");
                return Err(PlaneError::SigningFailed {
                    entity: identifier.to_string(),
                    source,
                });
            }
        };
        progress.advance(SolverState::TokenSigned);

        let mut response = ChallengeResponse::new(sig);
        if let Some(resolver) = &self.resolver {
            let chain = match resolver.resolve(identifier).await {
                Ok(chain) => chain,
                Err(e) => {
                    progress.advance(SolverState::ChainUnavailable);
                    warn!(identifier = %identifier, error = %e, "Trust chain unavailable");
                    return Err(e.into());
                }
            };
            response = response.with_trust_chain(chain.to_compact());
        }
        progress.advance(SolverState::ResponseEmitted);

        info!(
            identifier = %identifier,
            kid = %kid,
            chain_attached = response.trust_chain.is_some(),
            "Solved challenge"
        );
        Ok(response)
    }

    /// Solve the authorization's challenge and hand the response to the CA
    ///
    /// The whole flow is bounded by the solver's timeout.
    pub async fn solve_and_validate(
        &self,
        authorization: &Authorization,
        validator: &dyn AcmeValidator,
    ) -> Result<ChallengeResponse> {
        let identifier = authorization.identifier.entity_id()?;
        let challenge = authorization.federation_challenge()?;

        let flow = async {
            let response = self.solve(&identifier, &challenge.token).await?;
            validator
                .validate(&authorization.identifier, challenge, &response)
                .await?;
            Ok::<_, PlaneError>(response)
        };

        tokio::time::timeout(self.timeout, flow)
            .await
            .map_err(|_| {
                warn!(identifier = %identifier, timeout = ?self.timeout, "Challenge flow timed out");
                PlaneError::Timeout(self.timeout)
            })?
    }

    /// Provision the challenge response out of band
    pub async fn present(&self, _authorization: &Authorization) -> Result<()> {
        Err(PlaneError::Unsupported("challenge presentation".into()))
    }

    /// Remove a provisioned challenge response
    pub async fn cleanup(&self, _authorization: &Authorization) -> Result<()> {
        Err(PlaneError::Unsupported("challenge cleanup".into()))
    }
}
