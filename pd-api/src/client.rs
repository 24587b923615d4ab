//! HTTP client for the PostDeck server REST API.
//!
//! Handles bearer authentication, custom headers, timeout management,
//! exponential backoff retry, and request/response lifecycle.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use pd_core::config::{AppConfig, ServerConfig};
use pd_core::error::{PdError, PdResult};

use crate::response::ErrorBody;

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// HTTP client for communicating with the PostDeck server.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Server origin (scheme + host, no path).
    origin: String,
    /// Default request timeout.
    timeout: Duration,
    /// Custom headers from server config.
    custom_headers: Vec<(String, String)>,
    /// Retry configuration.
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new ApiClient from server configuration.
    pub fn new(config: &ServerConfig) -> PdResult<Self> {
        let sanitized = AppConfig::sanitize_origin(&config.origin);
        if sanitized.is_empty() {
            return Err(PdError::MissingConfig("server.origin".into()));
        }

        let timeout = Duration::from_millis(config.api_timeout_ms);
        let inner = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| PdError::Http(format!("failed to build HTTP client: {e}")))?;

        let mut custom_headers: Vec<(String, String)> = config
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        custom_headers.sort();

        Ok(Self {
            inner,
            origin: derive_origin(&sanitized),
            timeout,
            custom_headers,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Get the server origin.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Build the full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    /// Apply custom headers and the bearer token to a request builder.
    fn apply_headers(&self, mut builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        for (key, value) in &self.custom_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Execute a request with exponential backoff retry.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> PdResult<Response> {
        let url = self.url(path);
        debug!("{} {}", method, path);

        let mut last_error: Option<PdError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying {} {} (attempt {}/{}) after {:.1}s",
                    method,
                    path,
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self.inner.request(method.clone(), &url).timeout(self.timeout);
            let builder = self.apply_headers(builder, token);

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from {}", status.as_u16(), path);
                        last_error = Some(PdError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Self::check_status(response).await;
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < self.retry_config.max_retries {
                        warn!("retryable error on {}: {}", path, err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PdError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(32));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    // --- Public HTTP methods ---

    /// Execute a GET request with automatic retry.
    pub async fn get(&self, path: &str, token: Option<&str>) -> PdResult<Response> {
        self.request_with_retry(Method::GET, path, token).await
    }

    // --- Response helpers ---

    /// Deserialize a response body.
    pub async fn parse_response<T: DeserializeOwned>(response: Response) -> PdResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| PdError::Serialization(format!("failed to parse response: {e}")))
    }

    /// Convenience: GET + parse.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> PdResult<T> {
        let resp = self.get(path, token).await?;
        Self::parse_response(resp).await
    }

    /// Check the HTTP status code and convert to PdError if needed.
    async fn check_status(response: Response) -> PdResult<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PdError::AuthFailed(format!("server returned {status}")));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PdError::ServerError {
                status: status.as_u16(),
                message: ErrorBody::describe(&body),
            });
        }

        Ok(response)
    }

    /// Classify a reqwest error into a PdError variant.
    fn classify_error(e: reqwest::Error) -> PdError {
        if e.is_timeout() {
            PdError::Timeout(e.to_string())
        } else if e.is_connect() {
            PdError::Http(format!("connection failed: {e}"))
        } else {
            PdError::Http(e.to_string())
        }
    }
}

/// Derive the origin (scheme + host + optional port) from a page address.
///
/// A socket origin maps to its HTTP counterpart.
fn derive_origin(address: &str) -> String {
    if let Ok(url) = reqwest::Url::parse(address) {
        let host = url.host_str().unwrap_or("localhost");
        let scheme = match url.scheme() {
            "wss" => "https",
            "ws" => "http",
            other => other,
        };
        match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        }
    } else {
        address.to_string()
    }
}
