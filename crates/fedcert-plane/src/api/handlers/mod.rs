//! API request handlers

pub mod federation;
pub mod subordinates;

pub use federation::{entity_configuration, fetch_subordinate_statement, FetchQuery};
pub use subordinates::{
    add_subordinates, list_subordinates, AddSubordinatesRequest, AddSubordinatesResponse,
    ListSubordinatesResponse,
};

use fedcert_trust::StatementFetcher;
use std::sync::Arc;

use crate::host::HostedEntity;

/// Application state shared across handlers
pub struct AppState {
    /// Entity whose statements this router publishes
    pub entity: Arc<HostedEntity>,
    /// Used to fetch the configurations of new subordinates
    pub fetcher: Arc<dyn StatementFetcher>,
}
