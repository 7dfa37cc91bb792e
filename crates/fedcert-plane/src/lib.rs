//! # Fedcert Plane
//!
//! Hosting and ACME-facing glue for OpenID Federation entities:
//! - Hosts entities and signs their statements on demand
//! - Records subordinations and issues Subordinate Statements
//! - Publishes statements in-process or over HTTP
//! - Solves `openid-federation-01` challenges and verifies them CA-side
//!
//! ## API Endpoints (per hosted entity)
//!
//! - `GET /health` - Liveness check
//! - `GET /.well-known/openid-federation` - Entity Configuration
//! - `GET /fetch?sub=<id>` - Subordinate Statement about a registered subordinate
//! - `POST /subordinates` - Register subordinates `{"subordinates": [...]}`
//! - `GET /subordinates` - List registered subordinates

pub mod api;
pub mod challenge;
pub mod config;
pub mod directory;
pub mod error;
pub mod host;
pub mod publish;
pub mod storage;
pub mod validator;

pub use api::handlers::AppState;
pub use api::{create_router, ENTITY_STATEMENT_CONTENT_TYPE};
pub use challenge::{
    AcmeValidator, Authorization, Challenge, ChallengeSolver, Identifier, SolverState,
    DEFAULT_SOLVE_TIMEOUT,
};
pub use config::PlaneConfig;
pub use directory::LocalFederation;
pub use error::{PlaneError, Result};
pub use host::HostedEntity;
pub use publish::{HttpPublisher, Publisher};
pub use storage::{MemoryStore, SubordinateRecord, SubordinateStore};
pub use validator::{new_token, verify_challenge_response, ChainValidator};
