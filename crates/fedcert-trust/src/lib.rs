//! # Fedcert Trust
//!
//! Trust chain resolution for OpenID Federation entities.
//!
//! ## Components
//!
//! - **StatementFetcher**: injected source of compact statements (HTTP or
//!   in-memory)
//! - **FederationGraph**: declared edges and the trust anchors a verifier
//!   accepts
//! - **TrustChainResolver**: walks `authority_hints` from a target to an
//!   anchor, verifying every hop
//! - **TrustChain**: the verified result, with metadata lookup and the compact
//!   form attached to challenge responses
//!
//! Local graph records are never trusted on their own: every edge in a chain
//! comes from a statement the superior published and signed.

pub mod chain;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod http;
pub mod resolver;

pub use chain::{ChainLink, TrustChain};
pub use error::{Result, TrustError};
pub use fetch::{MemoryFetcher, StatementFetcher};
pub use graph::FederationGraph;
pub use http::{HttpFetcher, DEFAULT_FETCH_TIMEOUT, FETCH_PATH};
pub use resolver::{ResolverConfig, TrustChainResolver, DEFAULT_MAX_DEPTH};
