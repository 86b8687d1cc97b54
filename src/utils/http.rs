//! HTTP client and the retrying request executor.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use super::retry::{with_retry, RetryConfig};
use crate::config::ClientConfig;
use crate::sources::SourceError;

/// Wait applied to a 429 response that carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Header some providers use to advertise their request rate
pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Raw successful response, uninterpreted
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Requests per second the provider advertised, when it did
    pub advertised_rate: Option<f64>,
}

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, SourceError> {
        Self::from_config(&ClientConfig::default(), RetryConfig::default())
    }

    /// Create a new HTTP client with a custom user agent
    pub fn with_user_agent(user_agent: &str) -> Result<Self, SourceError> {
        let config = ClientConfig {
            user_agent: user_agent.to_string(),
            ..ClientConfig::default()
        };
        Self::from_config(&config, RetryConfig::default())
    }

    /// Create a client from the `[client]` configuration section
    pub fn from_config(config: &ClientConfig, retry: RetryConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(config.full_user_agent())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            retry,
        })
    }

    /// Create from an existing reqwest Client
    pub fn from_client(client: Arc<Client>) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    /// GET `url`, retrying transient transport faults
    pub async fn get(&self, provider: &str, url: &str) -> Result<HttpResponse, SourceError> {
        self.execute(provider, Method::GET, url).await
    }

    /// Perform one logical request and classify its outcome.
    ///
    /// Only timeouts and connection failures are retried. A 429 becomes
    /// [`SourceError::RateLimited`], 5xx becomes [`SourceError::Unavailable`],
    /// and any other non-2xx becomes [`SourceError::RequestFailed`].
    pub async fn execute(
        &self,
        provider: &str,
        method: Method,
        url: &str,
    ) -> Result<HttpResponse, SourceError> {
        with_retry(self.retry, || self.send_once(provider, method.clone(), url)).await
    }

    async fn send_once(
        &self,
        provider: &str,
        method: Method,
        url: &str,
    ) -> Result<HttpResponse, SourceError> {
        tracing::debug!(provider, %method, url, "Sending request");

        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status();
        let advertised_rate = advertised_rate(response.headers());

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after(response.headers());
            tracing::warn!(
                provider,
                retry_after_secs = retry_after.as_secs(),
                "Provider returned 429"
            );
            return Err(SourceError::RateLimited {
                provider: provider.to_string(),
                retry_after,
            });
        }

        if status.is_server_error() {
            return Err(SourceError::Unavailable {
                provider: provider.to_string(),
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .map(|body| body.chars().take(200).collect::<String>())
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| status.to_string());
            return Err(SourceError::RequestFailed {
                provider: provider.to_string(),
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(provider, e))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
            advertised_rate,
        })
    }
}

fn transport_error(provider: &str, err: reqwest::Error) -> SourceError {
    let provider = provider.to_string();
    let message = err.to_string();
    if err.is_timeout() {
        SourceError::Timeout { provider, message }
    } else if err.is_connect() || err.is_request() {
        SourceError::Connection { provider, message }
    } else {
        SourceError::RequestFailed {
            provider,
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

/// `Retry-After` in delta-seconds; HTTP-dates and garbage fall back to the default
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn advertised_rate(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(RATE_LIMIT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|rate| rate.is_finite() && *rate > 0.0)
}
