//! Outbound HTTP client with rate limiting, auth injection, a transform
//! pipeline and classified retry.
//!
//! # Request lifecycle
//!
//! ```text
//! acquire token ─▶ build ─▶ auth ─▶ request transforms ─▶ send ─┬─▶ response transforms ─▶ Ok
//!       ▲                                                       │
//!       └──────── backoff sleep ◀── retryable & budget left ◀───┘ (else classified Err)
//! ```
//!
//! Auth and request transforms run once per logical call: retries resend
//! the same transformed request, but each attempt consumes its own
//! rate-limit token.

mod auth;
mod error;
pub mod transform;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

pub use auth::{AuthConfig, OAuth2Credentials};
pub use error::{TransportError, TransportErrorKind};
pub use transform::{
    HeaderInjector, HmacSigner, QueryParamInjector, RequestTransform, ResponseTransform,
    UnwrapJsonField,
};

use crate::http_client::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::rate_limit::{RateLimit, TokenBucket};
use crate::retry::RetryPolicy;
use crate::ValidationError;
use auth::Authenticator;

/// Immutable configuration of one [`TransportClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub default_headers: BTreeMap<String, String>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimit,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: BTreeMap::from([(
                String::from("accept"),
                String::from("application/json"),
            )]),
            auth: AuthConfig::None,
            rate_limit: RateLimit::default(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ValidationError::InvalidBaseUrl {
                value: self.base_url.clone(),
            });
        }
        Ok(())
    }
}

/// Rate-limited, retrying HTTP client owned by exactly one source adapter.
pub struct TransportClient {
    config: ClientConfig,
    http: Arc<dyn HttpClient>,
    limiter: TokenBucket,
    auth: Authenticator,
    request_transforms: Vec<Box<dyn RequestTransform>>,
    response_transforms: Vec<Box<dyn ResponseTransform>>,
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("config", &self.config)
            .field("request_transforms", &self.request_transforms.len())
            .field("response_transforms", &self.response_transforms.len())
            .finish_non_exhaustive()
    }
}

impl TransportClient {
    /// Creates a client backed by a real reqwest transport.
    pub fn new(config: ClientConfig) -> Result<Self, ValidationError> {
        Self::with_http_client(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let limiter = TokenBucket::new(config.rate_limit)?;
        let auth = Authenticator::new(config.auth.clone());

        Ok(Self {
            config,
            http,
            limiter,
            auth,
            request_transforms: Vec::new(),
            response_transforms: Vec::new(),
        })
    }

    pub fn with_request_transform(mut self, transform: impl RequestTransform + 'static) -> Self {
        self.request_transforms.push(Box::new(transform));
        self
    }

    pub fn with_response_transform(mut self, transform: impl ResponseTransform + 'static) -> Self {
        self.response_transforms.push(Box::new(transform));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs one logical request.
    ///
    /// # Errors
    ///
    /// Returns a classified [`TransportError`] once retries are exhausted for
    /// retryable classes, or immediately for non-retryable ones.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<HttpResponse, TransportError> {
        self.limiter.acquire().await;

        // Once auth and transforms succeed, every retry resends that request.
        let mut prepared: Option<HttpRequest> = None;
        let mut retry_count = 0u32;
        loop {
            let outcome = match prepared.clone() {
                Some(request) => self.dispatch(request).await,
                None => match self.prepare(method, path, params, body).await {
                    Ok(request) => {
                        prepared = Some(request.clone());
                        self.dispatch(request).await
                    }
                    Err(error) => Err(error),
                },
            };

            match outcome {
                Ok(response) => {
                    debug!(
                        method = %method,
                        path = %path,
                        status = response.status,
                        attempts = retry_count + 1,
                        "request succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    if !self.config.retry.should_retry(&error, retry_count) {
                        return Err(error.with_attempts(retry_count + 1));
                    }

                    retry_count += 1;
                    let delay = self.config.retry.delay_for_retry(retry_count);
                    warn!(
                        method = %method,
                        path = %path,
                        code = error.code(),
                        retry = retry_count,
                        max_retries = self.config.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request after classified failure"
                    );
                    tokio::time::sleep(delay).await;
                    self.limiter.acquire().await;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let response = self.request(HttpMethod::Get, path, params, None).await?;
        decode_json(&response)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let body = serde_json::to_value(body)
            .map_err(|e| TransportError::unknown(format!("failed to encode request body: {e}")))?;
        let response = self
            .request(HttpMethod::Post, path, &[], Some(&body))
            .await?;
        decode_json(&response)
    }

    /// Builds the request and applies auth plus request transforms. An
    /// OAuth2 token fetch happens here, so its failures share the retry budget.
    async fn prepare(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<HttpRequest, TransportError> {
        let mut request = self.build_request(method, path, params, body);
        self.auth.apply(&mut request, self.http.as_ref()).await?;
        for transform in &self.request_transforms {
            transform.apply(&mut request)?;
        }
        Ok(request)
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut response = self
            .http
            .execute(request)
            .await
            .map_err(|error| TransportError::from_http_error(&error))?;

        if !response.is_success() {
            return Err(TransportError::from_status(
                response.status,
                format!("upstream returned status {}", response.status),
            ));
        }

        for transform in &self.response_transforms {
            transform.apply(&mut response)?;
        }
        Ok(response)
    }

    fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> HttpRequest {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else if path.is_empty() {
            self.config.base_url.trim_end_matches('/').to_owned()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };

        let timeout_ms = self.config.timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        let mut request = HttpRequest::new(method, url).with_timeout_ms(timeout_ms);
        for (name, value) in &self.config.default_headers {
            request.set_header(name.as_str(), value.as_str());
        }
        for (name, value) in params {
            request.append_query(name, value);
        }
        if let Some(body) = body {
            request.set_header("content-type", "application/json");
            request.body = Some(body.to_string());
        }
        request
    }
}

fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, TransportError> {
    serde_json::from_str(&response.body)
        .map_err(|e| TransportError::unknown(format!("failed to decode response body: {e}")))
}
