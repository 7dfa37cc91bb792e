//! Trust chain resolution
//!
//! Resolution walks from a target entity up to a trust anchor:
//!
//! 1. Fetch the target's Entity Configuration and verify it against its own
//!    `jwks` (`iss == sub`, signature, expiry)
//! 2. If the target is a trust anchor, stop
//! 3. Otherwise try each entry of the configuration's `authority_hints` in
//!    order: verify the superior's configuration, fetch the Subordinate
//!    Statement it issued about the target, verify it with the superior's
//!    keys, check `iss`/`sub`, and check the superior vouches for the key
//!    that signed the target's configuration
//! 4. Recurse into the first superior that leads to an anchor
//!
//! Cycles (per path), depth overruns, timeouts and cancellation abort the
//! whole resolution. Any other failure of one superior moves on to the next;
//! when every superior fails, the first failure is reported. A chain is
//! returned only when every hop verified.

use fedcert_core::{EntityId, EntityStatement, UnverifiedStatement};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::{ChainLink, TrustChain};
use crate::error::{Result, TrustError};
use crate::fetch::StatementFetcher;
use crate::graph::FederationGraph;

/// Default maximum number of entities in a chain
pub const DEFAULT_MAX_DEPTH: usize = 8;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum number of entities in a chain, anchor included
    pub max_depth: usize,
    /// Overall time budget for one `resolve` call
    pub timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: None,
        }
    }
}

/// Resolves trust chains against a set of trust anchors
pub struct TrustChainResolver {
    fetcher: Arc<dyn StatementFetcher>,
    graph: Arc<FederationGraph>,
    config: ResolverConfig,
}

impl TrustChainResolver {
    /// Create a resolver trusting the anchors declared in `graph`
    pub fn new(fetcher: Arc<dyn StatementFetcher>, graph: Arc<FederationGraph>) -> Self {
        Self::with_config(fetcher, graph, ResolverConfig::default())
    }

    pub fn with_config(
        fetcher: Arc<dyn StatementFetcher>,
        graph: Arc<FederationGraph>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            fetcher,
            graph,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<FederationGraph> {
        &self.graph
    }

    /// Resolve a chain from `target` to a trust anchor
    ///
    /// Applies the configured timeout, if any.
    pub async fn resolve(&self, target: &EntityId) -> Result<TrustChain> {
        match self.config.timeout {
            Some(timeout) => self.resolve_within(target, timeout).await,
            None => self.resolve_unbounded(target).await,
        }
    }

    /// Resolve, giving up with `Timeout` after `timeout`
    pub async fn resolve_within(&self, target: &EntityId, timeout: Duration) -> Result<TrustChain> {
        tokio::time::timeout(timeout, self.resolve_unbounded(target))
            .await
            .map_err(|_| {
                warn!(target = %target, timeout = ?timeout, "Trust chain resolution timed out");
                TrustError::Timeout(timeout)
            })?
    }

    /// Resolve, giving up with `Cancelled` as soon as `cancel` completes
    pub async fn resolve_until<F>(&self, target: &EntityId, cancel: F) -> Result<TrustChain>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                warn!(target = %target, "Trust chain resolution cancelled");
                Err(TrustError::Cancelled)
            }
            result = self.resolve_unbounded(target) => result,
        }
    }

    async fn resolve_unbounded(&self, target: &EntityId) -> Result<TrustChain> {
        debug!(target = %target, fetcher = self.fetcher.description(), "Resolving trust chain");

        let configuration = self.verified_configuration(target).await?;
        let links = self.walk(configuration, vec![target.clone()]).await?;
        let chain = TrustChain::new(links);

        info!(
            target = %target,
            length = chain.len(),
            anchor = %chain.trust_anchor().map(|l| l.entity_id().as_str()).unwrap_or_default(),
            "Resolved trust chain"
        );
        Ok(chain)
    }

    /// Walk up from an already verified configuration; `path` ends with its subject
    fn walk(
        &self,
        configuration: EntityStatement,
        path: Vec<EntityId>,
    ) -> BoxFuture<'_, Result<Vec<ChainLink>>> {
        Box::pin(async move {
            let current = configuration.sub().clone();

            if self.graph.is_trust_anchor(&current) {
                if let Some(pinned) = self.graph.trust_anchor_keys(&current) {
                    if !pinned.contains(configuration.kid()) {
                        return Err(TrustError::UnpinnedAnchorKey {
                            anchor: current.to_string(),
                            kid: configuration.kid().to_string(),
                        });
                    }
                }
                debug!(anchor = %current, "Reached trust anchor");
                return Ok(vec![ChainLink::anchor(configuration)]);
            }

            let superiors = configuration.claims().authority_hints.clone();
            if superiors.is_empty() {
                return Err(TrustError::NoTrustAnchor(current.to_string()));
            }
            if superiors.contains(&current) {
                return Err(TrustError::SelfSuperior(current.to_string()));
            }
            if path.len() >= self.config.max_depth {
                return Err(TrustError::DepthExceeded(self.config.max_depth));
            }

            let mut first_error = None;
            for superior in &superiors {
                if path.contains(superior) {
                    return Err(TrustError::CycleDetected {
                        entity: superior.to_string(),
                        path: format_path(&path, superior),
                    });
                }

                debug!(target = %current, superior = %superior, "Trying superior");
                match self.climb(&configuration, superior, &path).await {
                    Ok(links) => return Ok(links),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(
                            target = %current,
                            superior = %superior,
                            error = %e,
                            "Superior did not lead to a trust anchor"
                        );
                        first_error.get_or_insert(e);
                    }
                }
            }

            Err(first_error.unwrap_or_else(|| TrustError::NoTrustAnchor(current.to_string())))
        })
    }

    /// Verify one hop to `superior` and continue the walk from there
    async fn climb(
        &self,
        configuration: &EntityStatement,
        superior: &EntityId,
        path: &[EntityId],
    ) -> Result<Vec<ChainLink>> {
        let subject = configuration.sub();

        let superior_configuration = self.verified_configuration(superior).await?;

        let compact = self
            .fetcher
            .fetch_subordinate_statement(superior, subject)
            .await?;
        let statement = UnverifiedStatement::parse(&compact)
            .and_then(|s| s.verify(&superior_configuration.claims().jwks))
            .map_err(|e| TrustError::verification(superior, e))?;

        if statement.iss() != superior {
            return Err(TrustError::IssuerMismatch {
                expected: superior.to_string(),
                actual: statement.iss().to_string(),
            });
        }
        if statement.sub() != subject {
            return Err(TrustError::SubjectMismatch {
                expected: subject.to_string(),
                actual: statement.sub().to_string(),
            });
        }
        if !statement.claims().jwks.contains(configuration.kid()) {
            return Err(TrustError::UnvouchedKey {
                entity: subject.to_string(),
                superior: superior.to_string(),
                kid: configuration.kid().to_string(),
            });
        }

        let mut next_path = path.to_vec();
        next_path.push(superior.clone());
        let mut links = self.walk(superior_configuration, next_path).await?;

        links.insert(0, ChainLink::subordinate(configuration.clone(), statement));
        Ok(links)
    }

    /// Fetch and self-verify the Entity Configuration of `id`
    async fn verified_configuration(&self, id: &EntityId) -> Result<EntityStatement> {
        let compact = self.fetcher.fetch_entity_configuration(id).await?;
        let configuration = UnverifiedStatement::parse(&compact)
            .and_then(UnverifiedStatement::verify_self_signed)
            .map_err(|e| TrustError::verification(id, e))?;

        if configuration.sub() != id {
            return Err(TrustError::SubjectMismatch {
                expected: id.to_string(),
                actual: configuration.sub().to_string(),
            });
        }
        Ok(configuration)
    }
}

fn format_path(path: &[EntityId], repeated: &EntityId) -> String {
    path.iter()
        .chain(std::iter::once(repeated))
        .map(EntityId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
