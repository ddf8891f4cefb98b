use std::time::Duration;

use bytes::Bytes;
use promptline_core::config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use promptline_core::{ApiError, PromptlineConfig};
use promptline_stream::FramerOptions;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::retry::RetryPolicy;

pub(crate) const API_KEY_HEADER: &str = "x-api-key";
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP client for the generation API.
///
/// Non-streaming calls go through the configured [`RetryPolicy`]; streaming
/// calls are issued once and never retried.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) http: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryPolicy,
    pub(crate) stream: FramerOptions,
}

impl Client {
    /// Create a client with default settings. Fails on an empty key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey);
        }

        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            http: build_http_client(timeout)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
            retry: RetryPolicy::default(),
            stream: FramerOptions::default(),
        })
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &PromptlineConfig) -> Result<Self, ClientError> {
        let api_key = config.api_key.clone().unwrap_or_default();
        let mut client = Self::new(api_key)?;

        client.timeout = config.timeout();
        client.http = build_http_client(client.timeout)?;
        client.retry = RetryPolicy::from(&config.retry);
        client.stream = FramerOptions::from(&config.stream);
        client.set_base_url(&config.base_url);
        Ok(client)
    }

    /// Replace the underlying HTTP client (connection pool, proxies, TLS).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.set_base_url(base_url);
        self
    }

    /// Per-request timeout for non-streaming calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stream_options(mut self, options: FramerOptions) -> Self {
        self.stream = options;
        self
    }

    pub fn set_base_url(&mut self, base_url: impl AsRef<str>) {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_string();
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// One HTTP round trip, no retry. This is the unit the retry policy wraps.
    pub async fn attempt(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = self.url(path);
        debug!(%method, url = %url, "sending request");

        let mut builder = self
            .http
            .request(method, &url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout);
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(body);
        }
        builder.send().await
    }

    /// `GET path` with retries.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let resp = self
            .retry
            .run(|| self.attempt(Method::GET, path, None))
            .await?;
        Ok(resp)
    }

    /// `POST path` with a JSON body, with retries. The body is encoded once
    /// and reused by every attempt.
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let payload = Bytes::from(serde_json::to_vec(body).map_err(ClientError::Encode)?);
        debug!(path, body = %String::from_utf8_lossy(&payload), "POST body");

        let resp = self
            .retry
            .run(|| self.attempt(Method::POST, path, Some(payload.clone())))
            .await?;
        Ok(resp)
    }

    /// Decode a 2xx body into `T`, or turn anything else into an [`ApiError`]
    /// carrying the status and raw body.
    pub(crate) async fn handle_response<T>(&self, resp: reqwest::Response) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let status = resp.status();
        debug!(status = status.as_u16(), "received response");

        if !status.is_success() {
            let text = resp.text().await?;
            warn!(status = status.as_u16(), body = %text, "API error");
            return Err(ApiError::new(status.as_u16(), text).into());
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "failed to decode response body");
            ClientError::Decode(e)
        })
    }
}

/// Streams are long-lived, so the client only bounds connection setup; the
/// full-request timeout is applied per non-streaming request instead.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder().connect_timeout(timeout).build()?)
}
