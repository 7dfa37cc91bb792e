//! HTTP statement fetcher
//!
//! Entity Configurations are fetched from `<base>/.well-known/openid-federation`,
//! Subordinate Statements from the superior's `<base>/fetch?sub=<subordinate>`.
//! The base URL is the identifier itself unless an override is registered,
//! which lets `https` identifiers be served from loopback listeners during
//! development.

use async_trait::async_trait;
use fedcert_core::{EntityId, WELL_KNOWN_PATH};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TrustError};
use crate::fetch::StatementFetcher;

/// Path of the subordinate statement fetch endpoint
pub const FETCH_PATH: &str = "/fetch";

/// Default request timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Statement fetcher over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http_client: reqwest::Client,
    base_urls: HashMap<EntityId, String>,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_urls: HashMap::new(),
        })
    }

    /// Serve `id` from `base_url` instead of the identifier URL
    pub fn with_base_url(mut self, id: EntityId, base_url: impl Into<String>) -> Self {
        self.base_urls.insert(id, base_url.into());
        self
    }

    /// Base URL statements of `id` are fetched from
    pub fn base_url(&self, id: &EntityId) -> String {
        self.base_urls
            .get(id)
            .map(String::as_str)
            .unwrap_or(id.as_str())
            .trim_end_matches('/')
            .to_string()
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        debug!(url = %url, "Fetching statement");

        let response = self.http_client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrustError::Fetch {
                what: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl StatementFetcher for HttpFetcher {
    async fn fetch_entity_configuration(&self, id: &EntityId) -> Result<String> {
        let url = format!("{}{}", self.base_url(id), WELL_KNOWN_PATH);
        self.get(&url, &[]).await
    }

    async fn fetch_subordinate_statement(
        &self,
        superior: &EntityId,
        subordinate: &EntityId,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url(superior), FETCH_PATH);
        self.get(&url, &[("sub", subordinate.as_str())]).await
    }

    fn description(&self) -> &str {
        "HTTP statement fetcher"
    }
}
