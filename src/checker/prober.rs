//! HTTP reachability probe
//!
//! A link counts as reachable when a GET returns a success status (after at
//! most 10 redirects) and its body can be read in full within the download
//! timeout.

use crate::config::{CheckerConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Response};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Maximum number of redirects followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Reasons a link is considered unreachable
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("No response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("Response body not received within {0:?}")]
    DownloadTimeout(Duration),

    #[error("Connection failed")]
    Connect(#[source] reqwest::Error),

    #[error("HTTP {code}")]
    Status { code: u16 },

    #[error("Request failed")]
    Request(#[source] reqwest::Error),

    #[error("Failed to read response body")]
    Body(#[source] reqwest::Error),
}

/// Checks whether a URL is reachable
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `connect_timeout` - Time allowed to establish a connection
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use linkwatch::checker::build_http_client;
/// use linkwatch::config::UserAgentConfig;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "LinkWatch".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(connect_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Probes links over HTTP
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    response_timeout: Duration,
    download_timeout: Duration,
}

impl HttpProber {
    pub fn new(
        user_agent: &UserAgentConfig,
        checker: &CheckerConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, checker.connect_timeout())?;
        Ok(Self::with_client(
            client,
            checker.response_timeout(),
            checker.download_timeout(),
        ))
    }

    /// Wraps an existing client
    pub fn with_client(
        client: Client,
        response_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            client,
            response_timeout,
            download_timeout,
        }
    }

    async fn drain(mut response: Response) -> Result<usize, reqwest::Error> {
        let mut received = 0;
        while let Some(chunk) = response.chunk().await? {
            received += chunk.len();
        }
        Ok(received)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let response = match timeout(self.response_timeout, self.client.get(url).send()).await {
            Err(_) => return Err(ProbeError::ResponseTimeout(self.response_timeout)),
            Ok(Err(e)) if e.is_connect() => return Err(ProbeError::Connect(e)),
            Ok(Err(e)) => return Err(ProbeError::Request(e)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                code: status.as_u16(),
            });
        }

        match timeout(self.download_timeout, Self::drain(response)).await {
            Err(_) => Err(ProbeError::DownloadTimeout(self.download_timeout)),
            Ok(Err(e)) => Err(ProbeError::Body(e)),
            Ok(Ok(received)) => {
                tracing::trace!(url, status = status.as_u16(), received, "Probe succeeded");
                Ok(())
            }
        }
    }
}
