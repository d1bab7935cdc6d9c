//! reqwest-backed [`Fetcher`].
//!
//! Every fetch is bounded by a timeout; a timeout is reported as
//! [`WorkerError::Timeout`] so network-first routes fall back to the cache.

use super::fetcher::Fetcher;
use crate::config::NetworkConfig;
use crate::error::{Result, WorkerError};
use crate::request::{WorkerRequest, WorkerResponse};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect, Client};
use std::time::Duration;
use tracing::debug;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Whether a header applies to one hop only.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// HTTP fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout that follows redirects.
    pub fn new() -> Result<Self> {
        Self::with_options(NetworkConfig::REQUEST_TIMEOUT, true)
    }

    /// Create a fetcher with a custom timeout.
    ///
    /// A proxy passes `follow_redirects = false` so 3xx responses reach the
    /// browser unchanged.
    pub fn with_options(timeout: Duration, follow_redirects: bool) -> Result<Self> {
        let policy = if follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT.min(timeout))
            .user_agent(NetworkConfig::USER_AGENT)
            .redirect(policy)
            .build()
            .map_err(|e| WorkerError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self { client, timeout })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_send_error(&self, request: &WorkerRequest, err: reqwest::Error) -> WorkerError {
        if err.is_timeout() {
            WorkerError::Timeout(self.timeout)
        } else {
            WorkerError::Network {
                message: format!("{} {} failed: {}", request.method, request.url, err),
                cause: Some(err.to_string()),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(WorkerResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("Host"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[tokio::test]
    async fn test_fetcher_creation() {
        let fetcher = HttpFetcher::with_options(Duration::from_secs(5), false).unwrap();
        assert_eq!(fetcher.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_failure() {
        let fetcher = HttpFetcher::with_options(Duration::from_secs(2), true).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let request = WorkerRequest::get(Url::parse("http://127.0.0.1:9/").unwrap());
        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(err.is_network_failure());
    }
}
