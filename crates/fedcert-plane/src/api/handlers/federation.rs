//! Federation endpoints
//!
//! Statements are signed per request so `iat`/`exp` are always fresh.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use fedcert_core::EntityId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::api::error::ApiError;
use crate::api::ENTITY_STATEMENT_CONTENT_TYPE;

/// GET /.well-known/openid-federation
///
/// The hosted entity's Entity Configuration.
pub async fn entity_configuration(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let statement = state.entity.entity_configuration()?;
    debug!(entity = %state.entity.id(), kid = %statement.kid(), "Issued entity configuration");

    Ok((
        [(header::CONTENT_TYPE, ENTITY_STATEMENT_CONTENT_TYPE)],
        statement.into_compact(),
    ))
}

/// Query of the fetch endpoint
#[derive(Debug, Deserialize)]
pub struct FetchQuery {
    /// Subordinate the statement is about
    pub sub: String,
}

/// GET /fetch?sub=<id>
///
/// Subordinate Statement about a registered subordinate.
pub async fn fetch_subordinate_statement(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FetchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let subordinate = EntityId::parse(query.sub)?;
    let statement = state.entity.subordinate_statement(&subordinate).await?;
    debug!(
        superior = %state.entity.id(),
        subordinate = %subordinate,
        "Issued subordinate statement"
    );

    Ok((
        [(header::CONTENT_TYPE, ENTITY_STATEMENT_CONTENT_TYPE)],
        statement.into_compact(),
    ))
}
