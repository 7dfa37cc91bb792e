//! Subordination management endpoints

use axum::{extract::State, Json};
use fedcert_core::EntityId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::api::error::ApiError;

/// Request to register subordinates
#[derive(Debug, Deserialize)]
pub struct AddSubordinatesRequest {
    /// Identifiers of the entities to vouch for
    pub subordinates: Vec<String>,
}

/// Response from subordinate registration
#[derive(Debug, Serialize)]
pub struct AddSubordinatesResponse {
    /// Superior the subordinates were registered with
    pub superior: String,
    /// Subordinates registered by this request
    pub added: Vec<String>,
}

/// POST /subordinates
///
/// Fetch and self-verify each subordinate's Entity Configuration, then record
/// the federation keys it publishes.
pub async fn add_subordinates(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddSubordinatesRequest>,
) -> Result<Json<AddSubordinatesResponse>, ApiError> {
    if request.subordinates.is_empty() {
        return Err(ApiError::BadRequest("No subordinates given".into()));
    }

    let ids = request
        .subordinates
        .into_iter()
        .map(EntityId::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let added = state
        .entity
        .add_subordinates(&ids, state.fetcher.as_ref())
        .await?;

    info!(
        superior = %state.entity.id(),
        count = added.len(),
        "Registered subordinates via API"
    );

    Ok(Json(AddSubordinatesResponse {
        superior: state.entity.id().to_string(),
        added: added.iter().map(ToString::to_string).collect(),
    }))
}

/// Response listing subordinates
#[derive(Debug, Serialize)]
pub struct ListSubordinatesResponse {
    pub superior: String,
    pub subordinates: Vec<String>,
}

/// GET /subordinates
pub async fn list_subordinates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListSubordinatesResponse>, ApiError> {
    let subordinates = state.entity.subordinates().await?;

    Ok(Json(ListSubordinatesResponse {
        superior: state.entity.id().to_string(),
        subordinates: subordinates.iter().map(ToString::to_string).collect(),
    }))
}
