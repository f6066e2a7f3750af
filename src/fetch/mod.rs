//! Fetch collaborators
//!
//! The worker agent never talks HTTP directly; it goes through the
//! [`Fetcher`] trait so measurement logic can be tested against a mock.
//! Production uses [`HttpFetcher`] (reqwest). Public IP discovery, used at
//! worker startup to build the externally reachable address, lives here too.

use anyhow::{Context, Result};
use std::future::Future;

/// Endpoint that answers with the caller's public IP as plain text
pub const PUBLIC_IP_ENDPOINT: &str = "http://myexternalip.com/raw";

/// The HTTP fetch primitive the worker measures
///
/// Implementations return the full response body; latency is measured by the
/// caller around the call.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch a URI and return the response body
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Production fetcher backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", uri))?;

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body from {}", uri))?;

        Ok(body.to_vec())
    }
}

/// Discover this machine's public IP via an external what-is-my-ip service
///
/// Workers listen on a private interface but must register an address the
/// server can reach from outside (cloud VMs typically NAT their public IP).
pub async fn discover_public_ip() -> Result<String> {
    let body = reqwest::get(PUBLIC_IP_ENDPOINT)
        .await
        .context("Failed to contact public IP service")?
        .text()
        .await
        .context("Failed to read public IP response")?;

    let ip = body.trim().to_string();
    if ip.is_empty() {
        anyhow::bail!("Public IP service returned an empty response");
    }

    Ok(ip)
}

/// Canned fetcher for tests and dry runs
///
/// Returns a fixed body for every URI, or a fixed failure.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    body: Option<Vec<u8>>,
}

impl MockFetcher {
    /// A fetcher that always succeeds with the given body
    pub fn returning(body: impl Into<Vec<u8>>) -> Self {
        Self { body: Some(body.into()) }
    }

    /// A fetcher that always fails
    pub fn failing() -> Self {
        Self { body: None }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        match &self.body {
            Some(body) => Ok(body.clone()),
            None => anyhow::bail!("Mock fetch failure for {}", uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_returns_body() {
        let fetcher = MockFetcher::returning("hello");
        let body = fetcher.fetch("http://example.com").await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_mock_fetcher_failure() {
        let fetcher = MockFetcher::failing();
        assert!(fetcher.fetch("http://example.com").await.is_err());
    }
}
