//! Source provider client
//!
//! Fetches raw author and publication records from the scraping service.
//! The service is slow and unreliable; failures are reported to the caller
//! and never retried here. A later stale read re-triggers the fetch.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use pip_common::config::QueueConfig;
use pip_common::models::{RawAuthor, RawPublication};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::dispatch::region::{region_endpoint, select_region};

/// Source provider errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Source error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Raw record source
///
/// `target_url` is the regional endpoint recorded on the refresh task; an
/// empty one lets the provider pick the region itself.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_author(&self, target_url: &str, author_id: &str) -> Result<RawAuthor, SourceError>;

    async fn fetch_publication(&self, target_url: &str, publication_id: &str) -> Result<RawPublication, SourceError>;
}

/// HTTP client for the regional scraping endpoints
pub struct HttpSourceProvider {
    client: Client,
    author_endpoint: String,
    publication_endpoint: String,
    regions: Vec<String>,
    region_epoch: chrono::DateTime<chrono::Utc>,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpSourceProvider {
    pub fn new(config: &QueueConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.source_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.source_rate_per_sec).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            author_endpoint: config.author_endpoint.clone(),
            publication_endpoint: config.publication_endpoint.clone(),
            regions: config.regions.clone(),
            region_epoch: config.region_epoch,
            rate_limiter,
        })
    }

    fn endpoint(&self, target_url: &str, template: &str) -> String {
        if !target_url.trim().is_empty() {
            return target_url.to_string();
        }
        let region = select_region(pip_common::time::now(), self.region_epoch, &self.regions);
        region_endpoint(template, region)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: serde_json::Value,
        id: &str,
    ) -> Result<T, SourceError> {
        self.rate_limiter.until_ready().await;

        debug!(url, id, "Fetching from source");

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SourceProvider for HttpSourceProvider {
    async fn fetch_author(&self, target_url: &str, author_id: &str) -> Result<RawAuthor, SourceError> {
        let url = self.endpoint(target_url, &self.author_endpoint);
        self.post(&url, json!({ "scholar_id": author_id }), author_id)
            .await
    }

    async fn fetch_publication(&self, target_url: &str, publication_id: &str) -> Result<RawPublication, SourceError> {
        let url = self.endpoint(target_url, &self.publication_endpoint);
        self.post(&url, json!({ "author_pub_id": publication_id }), publication_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        let provider = HttpSourceProvider::new(&QueueConfig::default()).unwrap();
        let url = provider.endpoint("", &provider.author_endpoint);
        assert!(url.starts_with("https://"));
        assert!(!url.contains("{region}"));
    }

    #[test]
    fn test_task_endpoint_is_used_as_is() {
        let provider = HttpSourceProvider::new(&QueueConfig::default()).unwrap();
        let url = provider.endpoint("https://r1.example.test/fill_publication", &provider.publication_endpoint);
        assert_eq!(url, "https://r1.example.test/fill_publication");
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let config = QueueConfig {
            source_rate_per_sec: 0,
            ..Default::default()
        };
        assert!(HttpSourceProvider::new(&config).is_ok());
    }
}
