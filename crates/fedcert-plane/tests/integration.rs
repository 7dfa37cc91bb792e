//! Integration Tests for the Federation Plane
//!
//! These tests verify hosting and challenge solving end to end:
//! - Publication router responses and error bodies
//! - Subordination through the API
//! - Trust chain resolution over in-process and HTTP publication
//! - Challenge solving with CA-side validation of the attached chain

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use fedcert_core::{
    Entity, EntityId, EntityOptions, KeyAlgorithm, UnverifiedStatement, WELL_KNOWN_PATH,
};
use fedcert_plane::{
    create_router, new_token, verify_challenge_response, AcmeValidator, AppState, Authorization,
    ChainValidator, Challenge, ChallengeSolver, HostedEntity, HttpPublisher, Identifier,
    LocalFederation, PlaneError, Publisher, ENTITY_STATEMENT_CONTENT_TYPE,
};
use fedcert_trust::{
    FederationGraph, HttpFetcher, MemoryFetcher, StatementFetcher, TrustChainResolver, TrustError,
};
use std::sync::Arc;
use tower::ServiceExt;

// =============================================================================
// Test Helpers
// =============================================================================

fn id(name: &str) -> EntityId {
    EntityId::parse(format!("https://{}.example", name)).expect("valid identifier")
}

fn ec_entity(name: &str) -> Entity {
    let options = EntityOptions::default()
        .with_federation_algorithm(KeyAlgorithm::EcP256)
        .with_certifiable_algorithms(vec![KeyAlgorithm::EcP256]);
    Entity::with_options(id(name), options).expect("entity creation should succeed")
}

/// Trust anchor, intermediate and leaf served in-process
struct TestFederation {
    directory: Arc<LocalFederation>,
    trust_anchor: Arc<HostedEntity>,
    intermediate: Arc<HostedEntity>,
    leaf: Arc<HostedEntity>,
}

impl TestFederation {
    async fn new() -> Self {
        let graph = Arc::new(FederationGraph::new());
        let directory = Arc::new(LocalFederation::new());
        let host = |name| Arc::new(HostedEntity::new(ec_entity(name), graph.clone()));

        let fed = Self {
            directory,
            trust_anchor: host("ta"),
            intermediate: host("intermediate"),
            leaf: host("leaf"),
        };
        for member in [&fed.trust_anchor, &fed.intermediate, &fed.leaf] {
            fed.directory.start_serving(member.clone()).await.unwrap();
        }

        fed.intermediate
            .add_subordinates(&[fed.leaf.id().clone()], fed.directory.as_ref())
            .await
            .unwrap();
        fed.leaf.add_superior(fed.intermediate.id());

        fed.trust_anchor
            .add_subordinates(&[fed.intermediate.id().clone()], fed.directory.as_ref())
            .await
            .unwrap();
        fed.intermediate.add_superior(fed.trust_anchor.id());

        fed
    }

    /// Resolver on the requestor side, trusting the anchor
    fn resolver(&self) -> Arc<TrustChainResolver> {
        let graph = Arc::new(FederationGraph::new());
        graph.add_trust_anchor(self.trust_anchor.id());
        Arc::new(TrustChainResolver::new(self.directory.clone(), graph))
    }

    /// CA trust store pinning the anchor's keys
    fn ca_trust(&self) -> Arc<FederationGraph> {
        let graph = Arc::new(FederationGraph::new());
        graph.pin_trust_anchor(
            self.trust_anchor.id(),
            self.trust_anchor.entity().federation_jwks(),
        );
        graph
    }

    fn authorization(&self, token: &str) -> Authorization {
        Authorization {
            identifier: Identifier::openid_federation(self.leaf.id()),
            challenges: vec![Challenge::openid_federation(
                token,
                "https://ca.example/acme/chall/1",
            )],
        }
    }
}

fn router_for(entity: Arc<HostedEntity>, fetcher: Arc<dyn StatementFetcher>) -> axum::Router {
    create_router(Arc::new(AppState { entity, fetcher }))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// =============================================================================
// Publication Router
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fed = TestFederation::new().await;
    let app = router_for(fed.leaf.clone(), fed.directory.clone());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_well_known_serves_entity_configuration() {
    let fed = TestFederation::new().await;
    let app = router_for(fed.leaf.clone(), fed.directory.clone());

    let response = app.oneshot(get(WELL_KNOWN_PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        ENTITY_STATEMENT_CONTENT_TYPE
    );

    let compact = String::from_utf8(body_bytes(response).await).unwrap();
    let statement = UnverifiedStatement::parse(&compact)
        .unwrap()
        .verify_self_signed()
        .unwrap();
    assert_eq!(statement.sub(), fed.leaf.id());
    assert_eq!(
        statement.claims().authority_hints,
        vec![fed.intermediate.id().clone()]
    );
}

#[tokio::test]
async fn test_fetch_serves_subordinate_statement() {
    let fed = TestFederation::new().await;
    let app = router_for(fed.intermediate.clone(), fed.directory.clone());

    let uri = format!("/fetch?sub={}", fed.leaf.id());
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let compact = String::from_utf8(body_bytes(response).await).unwrap();
    let statement = UnverifiedStatement::parse(&compact)
        .unwrap()
        .verify(&fed.intermediate.entity().federation_jwks())
        .unwrap();
    assert_eq!(statement.iss(), fed.intermediate.id());
    assert_eq!(statement.sub(), fed.leaf.id());
    assert_eq!(statement.claims().jwks, fed.leaf.entity().federation_jwks());
}

#[tokio::test]
async fn test_fetch_unknown_subordinate_is_not_found() {
    let fed = TestFederation::new().await;
    let app = router_for(fed.trust_anchor.clone(), fed.directory.clone());

    // leaf is the intermediate's subordinate, not the anchor's
    let uri = format!("/fetch?sub={}", fed.leaf.id());
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "UNKNOWN_SUBORDINATE");
}

#[tokio::test]
async fn test_fetch_invalid_identifier_is_bad_request() {
    let fed = TestFederation::new().await;
    let app = router_for(fed.trust_anchor.clone(), fed.directory.clone());

    let response = app
        .oneshot(get("/fetch?sub=http://plain.example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// =============================================================================
// Subordination API
// =============================================================================

#[tokio::test]
async fn test_add_subordinates_through_api() {
    let graph = Arc::new(FederationGraph::new());
    let directory = Arc::new(LocalFederation::new());
    let ta = Arc::new(HostedEntity::new(ec_entity("ta"), graph.clone()));
    let member = Arc::new(HostedEntity::new(ec_entity("member"), graph.clone()));
    directory.start_serving(member.clone()).await.unwrap();

    let app = router_for(ta.clone(), directory.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/subordinates",
            serde_json::json!({ "subordinates": [member.id()] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["added"][0], member.id().as_str());

    let response = app.oneshot(get("/subordinates")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["subordinates"], serde_json::json!([member.id()]));
    assert!(graph.is_subordinate(ta.id(), member.id()));
}

#[tokio::test]
async fn test_add_unreachable_subordinate_is_bad_gateway() {
    let graph = Arc::new(FederationGraph::new());
    let ta = Arc::new(HostedEntity::new(ec_entity("ta"), graph));
    let app = router_for(ta.clone(), Arc::new(MemoryFetcher::new()));

    let response = app
        .oneshot(post_json(
            "/subordinates",
            serde_json::json!({ "subordinates": [id("ghost")] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "FETCH_FAILED");
    assert!(ta.subordinates().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_empty_subordinate_list_rejected() {
    let graph = Arc::new(FederationGraph::new());
    let ta = Arc::new(HostedEntity::new(ec_entity("ta"), graph));
    let app = router_for(ta, Arc::new(MemoryFetcher::new()));

    let response = app
        .oneshot(post_json(
            "/subordinates",
            serde_json::json!({ "subordinates": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Resolution and Challenge Solving
// =============================================================================

#[tokio::test]
async fn test_resolve_three_entity_federation_in_process() {
    let fed = TestFederation::new().await;

    let chain = fed.resolver().resolve(fed.leaf.id()).await.unwrap();
    assert_eq!(
        chain.entity_ids(),
        vec![fed.leaf.id(), fed.intermediate.id(), fed.trust_anchor.id()]
    );
}

#[tokio::test]
async fn test_solve_and_validate_with_attached_chain() {
    let fed = TestFederation::new().await;
    let solver = ChallengeSolver::new(vec![fed.leaf.entity().clone()])
        .with_trust_chain(fed.resolver());
    let validator = ChainValidator::new(fed.ca_trust());

    let token = new_token();
    let response = solver
        .solve_and_validate(&fed.authorization(&token), &validator)
        .await
        .unwrap();

    assert_eq!(response.trust_chain.as_ref().map(Vec::len), Some(5));
}

#[tokio::test]
async fn test_validator_falls_back_to_own_resolver() {
    let fed = TestFederation::new().await;
    let solver = ChallengeSolver::new(vec![fed.leaf.entity().clone()]);
    let ca_resolver = Arc::new(TrustChainResolver::new(
        fed.directory.clone(),
        fed.ca_trust(),
    ));
    let validator = ChainValidator::new(fed.ca_trust()).with_resolver(ca_resolver);

    let response = solver
        .solve_and_validate(&fed.authorization("fallback-token"), &validator)
        .await
        .unwrap();
    assert!(response.trust_chain.is_none());
}

#[tokio::test]
async fn test_validator_rejects_chain_to_untrusted_anchor() {
    let fed = TestFederation::new().await;
    let solver = ChallengeSolver::new(vec![fed.leaf.entity().clone()])
        .with_trust_chain(fed.resolver());

    let ca_trust = Arc::new(FederationGraph::new());
    ca_trust.add_trust_anchor(&id("other-anchor"));
    let validator = ChainValidator::new(ca_trust);

    let result = solver
        .solve_and_validate(&fed.authorization("token"), &validator)
        .await;
    assert!(matches!(
        result,
        Err(PlaneError::Trust(TrustError::NoTrustAnchor(_)))
    ));
}

#[tokio::test]
async fn test_unpinned_anchor_accepted_through_own_resolver() {
    let fed = TestFederation::new().await;
    let solver = ChallengeSolver::new(vec![fed.leaf.entity().clone()]);

    // Trusted by identifier only; configurations are fetched by the CA
    let ca_trust = Arc::new(FederationGraph::new());
    ca_trust.add_trust_anchor(fed.trust_anchor.id());
    let ca_resolver = Arc::new(TrustChainResolver::new(
        fed.directory.clone(),
        ca_trust.clone(),
    ));
    let validator = ChainValidator::new(ca_trust).with_resolver(ca_resolver);

    let response = solver
        .solve_and_validate(&fed.authorization("unpinned-token"), &validator)
        .await
        .unwrap();
    assert!(response.trust_chain.is_none());
}

#[tokio::test]
async fn test_response_verifies_against_resolved_chain() {
    let fed = TestFederation::new().await;
    let resolver = fed.resolver();
    let chain = resolver.resolve(fed.leaf.id()).await.unwrap();

    let solver = ChallengeSolver::new(vec![fed.leaf.entity().clone()]);
    let response = solver.solve(fed.leaf.id(), "exact-token").await.unwrap();

    let kid = verify_challenge_response(&chain, fed.leaf.id(), "exact-token", &response).unwrap();
    assert!(fed.leaf.entity().certifiable_keys().get(&kid).is_some());

    assert!(verify_challenge_response(&chain, fed.leaf.id(), "other-token", &response).is_err());
}

#[tokio::test]
async fn test_rsa_entities_solve_end_to_end() {
    let graph = Arc::new(FederationGraph::new());
    let directory = Arc::new(LocalFederation::new());
    let ta = Arc::new(HostedEntity::new(Entity::generate(id("ta")).unwrap(), graph.clone()));
    let leaf = Arc::new(HostedEntity::new(
        Entity::generate(id("leaf")).unwrap(),
        graph.clone(),
    ));
    directory.start_serving(ta.clone()).await.unwrap();
    directory.start_serving(leaf.clone()).await.unwrap();
    ta.add_subordinates(&[leaf.id().clone()], directory.as_ref())
        .await
        .unwrap();
    leaf.add_superior(ta.id());

    let trust = Arc::new(FederationGraph::new());
    trust.pin_trust_anchor(ta.id(), ta.entity().federation_jwks());
    let resolver = Arc::new(TrustChainResolver::new(directory.clone(), trust.clone()));

    let solver = ChallengeSolver::new(vec![leaf.entity().clone()])
        .with_trust_chain(resolver)
        .with_key_algorithm(KeyAlgorithm::Rsa2048);
    let authorization = Authorization {
        identifier: Identifier::openid_federation(leaf.id()),
        challenges: vec![Challenge::openid_federation("rsa-token", "https://ca.example/c")],
    };

    ChainValidator::new(trust)
        .validate(
            &authorization.identifier,
            &authorization.challenges[0],
            &solver.solve(leaf.id(), "rsa-token").await.unwrap(),
        )
        .await
        .unwrap();
}

// =============================================================================
// HTTP Publication
// =============================================================================

#[tokio::test]
async fn test_resolve_over_http_publication() {
    let graph = Arc::new(FederationGraph::new());
    let ta = Arc::new(HostedEntity::new(ec_entity("ta"), graph.clone()));
    let leaf = Arc::new(HostedEntity::new(ec_entity("leaf"), graph.clone()));

    let publisher = HttpPublisher::new("127.0.0.1", 0, Arc::new(MemoryFetcher::new()));
    publisher.start_serving(ta.clone()).await.unwrap();
    publisher.start_serving(leaf.clone()).await.unwrap();

    let fetcher = Arc::new(
        HttpFetcher::new()
            .unwrap()
            .with_base_url(ta.id().clone(), publisher.base_url(ta.id()).unwrap())
            .with_base_url(leaf.id().clone(), publisher.base_url(leaf.id()).unwrap()),
    );

    ta.add_subordinates(&[leaf.id().clone()], fetcher.as_ref())
        .await
        .unwrap();
    leaf.add_superior(ta.id());

    let trust = Arc::new(FederationGraph::new());
    trust.pin_trust_anchor(ta.id(), ta.entity().federation_jwks());
    let chain = TrustChainResolver::new(fetcher.clone(), trust)
        .resolve(leaf.id())
        .await
        .unwrap();
    assert_eq!(chain.entity_ids(), vec![leaf.id(), ta.id()]);

    publisher.stop_serving(leaf.id()).await.unwrap();
    assert!(matches!(
        fetcher.fetch_entity_configuration(leaf.id()).await,
        Err(TrustError::Fetch { .. })
    ));
    publisher.stop_serving(ta.id()).await.unwrap();
}
