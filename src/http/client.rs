//! HTTP client with retry and header-driven backoff
//!
//! Provides the [`Requester`] used by async job repositories:
//! - Automatic retries with configurable backoff
//! - Rate-limit waits read from `Retry-After` / reset headers
//! - Ignorable statuses answered with "no response"
//! - Error classification for retry decisions

use super::backoff::{BackoffStrategy, RetryBackoff, WaitTimeFromHeader, WaitUntilTimeFromHeader};
use crate::config::{BackoffConfig, HttpConfig, RateLimitConfig};
use crate::error::{is_retryable_status, Error, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Formats a successful response for debug logging.
///
/// Runs once per successful response; the result is logged at debug level.
pub type LogFormatter<'a> = dyn Fn(&Response) -> String + Send + Sync + 'a;

/// Sends one logical request, retrying as needed.
///
/// `Ok(None)` means the response status was configured as ignorable.
#[async_trait]
pub trait Requester: Send + Sync {
    async fn send_request(
        &self,
        method: Method,
        path: &str,
        request: RequestConfig,
        log_formatter: Option<&LogFormatter<'_>>,
    ) -> Result<Option<Response>>;
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for all requests
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Statuses that yield `None` instead of an error
    pub ignore_statuses: Vec<u16>,
    /// Schedule used when no header says how long to wait
    pub retry_backoff: BackoffConfig,
    /// Rate limit headers
    pub rate_limit: RateLimitConfig,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for HttpClientConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(config.timeout_seconds),
            max_retries: config.max_retries,
            ignore_statuses: config.ignore_statuses.clone(),
            retry_backoff: config.retry_backoff.clone(),
            rate_limit: config.rate_limit.clone(),
            default_headers: HashMap::new(),
            user_agent: format!("solidafy-stream-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the retry schedule
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Set rate limit header handling
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    /// Treat a status as "no response"
    pub fn ignore_status(mut self, status: u16) -> Self {
        self.config.ignore_statuses.push(status);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Override timeout for this request
    pub timeout: Option<Duration>,
    /// Override max retries for this request
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set max retries
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// HTTP client with retry and header-driven backoff
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    /// Consulted in order on 429 responses
    header_strategies: Vec<Arc<dyn BackoffStrategy>>,
    retry_backoff: RetryBackoff,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let header_strategies: Vec<Arc<dyn BackoffStrategy>> = vec![
            Arc::new(WaitTimeFromHeader::from_config(&config.rate_limit)),
            Arc::new(WaitUntilTimeFromHeader::from_config(&config.rate_limit)),
        ];
        let retry_backoff = RetryBackoff::from_config(&config.retry_backoff);

        Ok(Self {
            client,
            config,
            header_strategies,
            retry_backoff,
        })
    }

    /// Replace the strategies consulted on rate-limited responses
    #[must_use]
    pub fn with_backoff_strategies(mut self, strategies: Vec<Arc<dyn BackoffStrategy>>) -> Self {
        self.header_strategies = strategies;
        self
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<Option<Response>> {
        self.request(Method::GET, url, RequestConfig::default(), None)
            .await
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, body: Value) -> Result<Option<Response>> {
        self.request(Method::POST, url, RequestConfig::default().json(body), None)
            .await
    }

    /// Make a generic request
    #[allow(clippy::too_many_lines)]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
        log_formatter: Option<&LogFormatter<'_>>,
    ) -> Result<Option<Response>> {
        let full_url = self.build_url(url)?;
        let max_retries = config.max_retries.unwrap_or(self.config.max_retries);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        let mut last_error = None;

        for attempt in 0..=max_retries {
            let mut req = self.client.request(method.clone(), full_url.clone());

            for (key, value) in &self.config.default_headers {
                req = req.header(key.as_str(), value.as_str());
            }
            for (key, value) in &config.headers {
                req = req.header(key.as_str(), value.as_str());
            }
            if !config.query.is_empty() {
                req = req.query(&config.query);
            }
            if let Some(ref body) = config.body {
                req = req.json(body);
            }
            req = req.timeout(timeout);

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if self.config.ignore_statuses.contains(&status.as_u16()) {
                        debug!(status = status.as_u16(), url = %full_url, "Ignoring response");
                        return Ok(None);
                    }

                    if status.is_success() {
                        if let Some(format) = log_formatter {
                            let formatted = format(&response);
                            debug!("{formatted}");
                        }
                        debug!("Request succeeded: {} {}", method, full_url);
                        return Ok(Some(response));
                    }

                    if is_retryable_status(status.as_u16()) {
                        if attempt == max_retries {
                            last_error = Some(exhausted_error(status, response.headers()));
                            break;
                        }
                        let delay = self.backoff_for(status, response.headers(), attempt)?;
                        warn!(
                            "Request failed with {}, attempt {}/{}, retrying in {:?}",
                            status.as_u16(),
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(Error::http_status(status.as_u16(), ""));
                        continue;
                    }

                    // Anything else is unexpected API behavior
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::http_status(status.as_u16(), body));
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    #[allow(clippy::cast_possible_truncation)]
                    let error = if e.is_timeout() {
                        Error::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        }
                    } else {
                        Error::Http(e)
                    };

                    if !retryable || attempt == max_retries {
                        return Err(error);
                    }

                    let delay = self.retry_backoff.delay(attempt);
                    warn!(
                        "{}, attempt {}/{}, retrying in {:?}",
                        error,
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(Error::MaxRetriesExceeded { max_retries }))
    }

    /// Wait before retrying a response: headers first on 429, then the schedule
    fn backoff_for(&self, status: StatusCode, headers: &HeaderMap, attempt: u32) -> Result<Duration> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            for strategy in &self.header_strategies {
                if let Some(wait) = strategy.backoff_time(headers, attempt)? {
                    return Ok(wait);
                }
            }
        }
        Ok(self.retry_backoff.delay(attempt))
    }

    /// Resolve a path against the base URL; absolute URLs pass through
    fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        match &self.config.base_url {
            Some(base) => {
                let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
                Ok(base.join(path.trim_start_matches('/'))?)
            }
            None => Ok(Url::parse(path)?),
        }
    }
}

#[async_trait]
impl Requester for HttpClient {
    async fn send_request(
        &self,
        method: Method,
        path: &str,
        request: RequestConfig,
        log_formatter: Option<&LogFormatter<'_>>,
    ) -> Result<Option<Response>> {
        self.request(method, path, request, log_formatter).await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("header_strategies", &self.header_strategies.len())
            .finish_non_exhaustive()
    }
}

fn exhausted_error(status: StatusCode, headers: &HeaderMap) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_seconds = headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(60);
        return Error::RateLimited {
            retry_after_seconds,
        };
    }
    Error::http_status(status.as_u16(), "")
}
