//! Federation Demo Binary
//!
//! Serves a trust anchor, an intermediate and a leaf over HTTP on consecutive
//! loopback ports, builds the subordinations through the HTTP API, resolves
//! the leaf's trust chain over HTTP and has an in-process CA validate an
//! `openid-federation-01` challenge solved by the leaf.

use fedcert_core::{Entity, EntityId};
use fedcert_plane::{
    new_token, Authorization, ChainValidator, Challenge, ChallengeSolver, HostedEntity,
    HttpPublisher, Identifier, PlaneConfig, PlaneError, Publisher, Result,
};
use fedcert_trust::{FederationGraph, HttpFetcher, TrustChainResolver, TrustError};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

const TRUST_ANCHOR: &str = "https://trust-anchor.fedcert.test";
const INTERMEDIATE: &str = "https://intermediate.fedcert.test";
const LEAF: &str = "https://leaf.fedcert.test";

struct Federation {
    trust_anchor: Arc<HostedEntity>,
    intermediate: Arc<HostedEntity>,
    leaf: Arc<HostedEntity>,
}

impl Federation {
    fn members(&self) -> [&Arc<HostedEntity>; 3] {
        [&self.trust_anchor, &self.intermediate, &self.leaf]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = PlaneConfig::from_env()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PlaneError::Config(format!("Failed to set tracing subscriber: {}", e)))?;

    info!(
        bind_host = %config.bind_host,
        base_port = config.base_port,
        version = fedcert_core::version(),
        "Starting federation demo"
    );

    // Identifiers are https URLs; the fetcher maps each to its loopback listener
    let ids = [
        EntityId::parse(TRUST_ANCHOR)?,
        EntityId::parse(INTERMEDIATE)?,
        EntityId::parse(LEAF)?,
    ];
    let mut fetcher = HttpFetcher::new()?;
    for (offset, id) in (0u16..).zip(ids.iter()) {
        fetcher = fetcher.with_base_url(id.clone(), listener_url(&config, offset)?);
    }
    let fetcher = Arc::new(fetcher);

    let graph = Arc::new(FederationGraph::new());
    let [ta_id, intermediate_id, leaf_id] = ids;
    let federation = Federation {
        trust_anchor: Arc::new(HostedEntity::new(Entity::generate(ta_id)?, graph.clone())),
        intermediate: Arc::new(HostedEntity::new(
            Entity::generate(intermediate_id)?,
            graph.clone(),
        )),
        leaf: Arc::new(HostedEntity::new(Entity::generate(leaf_id)?, graph.clone())),
    };

    let publisher = HttpPublisher::new(config.bind_host.clone(), config.base_port, fetcher.clone());
    for member in federation.members() {
        publisher.start_serving(member.clone()).await?;
        let served = publisher.base_url(member.id()).unwrap_or_default();
        if served != fetcher.base_url(member.id()) {
            return Err(PlaneError::Publish(format!(
                "{} is served from {}, expected {}",
                member.id(),
                served,
                fetcher.base_url(member.id())
            )));
        }
    }

    let outcome = run(&config, &federation, graph, fetcher).await;

    for member in federation.members() {
        publisher.stop_serving(member.id()).await?;
    }

    if let Err(e) = &outcome {
        error!(error = %e, "Federation demo failed");
    }
    outcome
}

async fn run(
    config: &PlaneConfig,
    federation: &Federation,
    graph: Arc<FederationGraph>,
    fetcher: Arc<HttpFetcher>,
) -> Result<()> {
    let client = reqwest::Client::new();

    // Subordinations go through the superiors' HTTP API
    register_subordinate(
        &client,
        &fetcher.base_url(federation.intermediate.id()),
        federation.leaf.id(),
    )
    .await?;
    federation.leaf.add_superior(federation.intermediate.id());

    register_subordinate(
        &client,
        &fetcher.base_url(federation.trust_anchor.id()),
        federation.intermediate.id(),
    )
    .await?;
    federation.intermediate.add_superior(federation.trust_anchor.id());

    // Requestor side: resolve the leaf's chain over HTTP
    graph.add_trust_anchor(federation.trust_anchor.id());
    let resolver = Arc::new(TrustChainResolver::with_config(
        fetcher,
        graph,
        config.resolver_config(),
    ));
    let chain = resolver.resolve(federation.leaf.id()).await?;
    info!(
        chain = ?chain.entity_ids().iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        "Resolved leaf trust chain over HTTP"
    );

    // CA side pins the trust anchor's keys and re-resolves from the attached chain
    let ca_trust = Arc::new(FederationGraph::new());
    ca_trust.pin_trust_anchor(
        federation.trust_anchor.id(),
        federation.trust_anchor.entity().federation_jwks(),
    );
    let validator = ChainValidator::new(ca_trust).with_config(config.resolver_config());

    let solver = ChallengeSolver::new(vec![federation.leaf.entity().clone()])
        .with_trust_chain(resolver)
        .with_timeout(config.solve_timeout);

    let authorization = Authorization {
        identifier: Identifier::openid_federation(federation.leaf.id()),
        challenges: vec![Challenge::openid_federation(
            new_token(),
            format!("https://ca.fedcert.test/acme/chall/{}", uuid::Uuid::new_v4()),
        )],
    };

    let response = solver.solve_and_validate(&authorization, &validator).await?;
    info!(
        identifier = %federation.leaf.id(),
        chain_statements = response.trust_chain.as_ref().map(Vec::len).unwrap_or(0),
        "Challenge solved and validated"
    );
    Ok(())
}

fn listener_url(config: &PlaneConfig, offset: u16) -> Result<String> {
    let port = config
        .base_port
        .checked_add(offset)
        .filter(|_| config.base_port != 0)
        .ok_or_else(|| PlaneError::Config("demo needs a fixed, non-zero base port".into()))?;
    Ok(format!("http://{}:{}", config.bind_host, port))
}

async fn register_subordinate(
    client: &reqwest::Client,
    superior_url: &str,
    subordinate: &EntityId,
) -> Result<()> {
    let url = format!("{}/subordinates", superior_url);
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "subordinates": [subordinate] }))
        .send()
        .await
        .map_err(TrustError::from)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TrustError::Fetch {
            what: url,
            message: format!("HTTP {}: {}", status, body),
        }
        .into());
    }

    info!(superior = %superior_url, subordinate = %subordinate, "Registered subordinate");
    Ok(())
}
