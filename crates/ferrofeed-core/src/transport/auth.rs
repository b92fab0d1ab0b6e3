use std::fmt::{Debug, Formatter};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::http_client::{HttpClient, HttpRequest};
use crate::transport::TransportError;

/// Tokens are refreshed this long before the upstream-declared expiry.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(30);
const TOKEN_DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

/// Authentication strategy applied to every outgoing request.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthConfig {
    #[default]
    None,
    /// Sent as `authorization: Bearer <key>`.
    ApiKey(String),
    Basic {
        username: String,
        password: String,
    },
    /// Client-credentials grant; the access token is cached per client.
    OAuth2(OAuth2Credentials),
}

#[derive(Clone, PartialEq, Eq)]
pub struct OAuth2Credentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

impl Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::OAuth2(credentials) => f.debug_tuple("OAuth2").field(credentials).finish(),
        }
    }
}

impl Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Applies an [`AuthConfig`] to requests, caching OAuth2 tokens.
pub(crate) struct Authenticator {
    config: AuthConfig,
    token: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    pub(crate) fn new(config: AuthConfig) -> Self {
        Self {
            config,
            token: Mutex::new(None),
        }
    }

    pub(crate) async fn apply(
        &self,
        request: &mut HttpRequest,
        http: &dyn HttpClient,
    ) -> Result<(), TransportError> {
        match &self.config {
            AuthConfig::None => {}
            AuthConfig::ApiKey(key) => {
                request.set_header("authorization", format!("Bearer {key}"));
            }
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                request.set_header("authorization", format!("Basic {encoded}"));
            }
            AuthConfig::OAuth2(credentials) => {
                let token = self
                    .access_token(credentials, http, request.timeout_ms)
                    .await?;
                request.set_header("authorization", format!("Bearer {token}"));
            }
        }
        Ok(())
    }

    async fn access_token(
        &self,
        credentials: &OAuth2Credentials,
        http: &dyn HttpClient,
        timeout_ms: u64,
    ) -> Result<String, TransportError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!(token_url = %credentials.token_url, "requesting oauth2 access token");

        let mut form = format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            urlencoding::encode(&credentials.client_id),
            urlencoding::encode(&credentials.client_secret)
        );
        if let Some(scope) = &credentials.scope {
            form.push_str("&scope=");
            form.push_str(&urlencoding::encode(scope));
        }

        let request = HttpRequest::post(&credentials.token_url)
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_header("accept", "application/json")
            .with_body(form)
            .with_timeout_ms(timeout_ms);

        let response = http
            .execute(request)
            .await
            .map_err(|error| TransportError::from_http_error(&error))?;

        if !response.is_success() {
            return Err(TransportError::from_status(
                response.status,
                "oauth2 token request was rejected",
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            TransportError::unknown(format!("failed to parse oauth2 token response: {e}"))
        })?;

        let lifetime = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(TOKEN_DEFAULT_LIFETIME);
        let refresh_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_SKEW);

        *cached = Some(CachedToken {
            access_token: parsed.access_token.clone(),
            refresh_at,
        });

        Ok(parsed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpFuture, HttpResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TokenEndpoint {
        calls: AtomicUsize,
    }

    impl HttpClient for TokenEndpoint {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                assert!(request
                    .body
                    .as_deref()
                    .unwrap_or_default()
                    .starts_with("grant_type=client_credentials"));
                Ok(HttpResponse::ok_json(
                    r#"{"access_token":"tok-1","expires_in":3600,"token_type":"bearer"}"#,
                ))
            })
        }
    }

    #[tokio::test]
    async fn api_key_becomes_bearer_header() {
        let auth = Authenticator::new(AuthConfig::ApiKey(String::from("secret")));
        let endpoint = TokenEndpoint {
            calls: AtomicUsize::new(0),
        };
        let mut request = HttpRequest::get("https://example.test/news");

        auth.apply(&mut request, &endpoint).await.expect("applies");

        assert_eq!(request.header("authorization"), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn basic_credentials_are_base64_encoded() {
        let auth = Authenticator::new(AuthConfig::Basic {
            username: String::from("Aladdin"),
            password: String::from("open sesame"),
        });
        let endpoint = TokenEndpoint {
            calls: AtomicUsize::new(0),
        };
        let mut request = HttpRequest::get("https://example.test/news");

        auth.apply(&mut request, &endpoint).await.expect("applies");

        assert_eq!(
            request.header("authorization"),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
    }

    #[tokio::test]
    async fn oauth2_token_is_fetched_once_and_cached() {
        let auth = Authenticator::new(AuthConfig::OAuth2(OAuth2Credentials {
            token_url: String::from("https://auth.example.test/token"),
            client_id: String::from("client"),
            client_secret: String::from("s3cret"),
            scope: Some(String::from("news:read")),
        }));
        let endpoint = TokenEndpoint {
            calls: AtomicUsize::new(0),
        };

        for _ in 0..3 {
            let mut request = HttpRequest::get("https://example.test/news");
            auth.apply(&mut request, &endpoint).await.expect("applies");
            assert_eq!(request.header("authorization"), Some("Bearer tok-1"));
        }

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", AuthConfig::ApiKey(String::from("hunter2")));
        assert!(!rendered.contains("hunter2"));
    }
}
