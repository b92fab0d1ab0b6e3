use std::sync::Arc;

use serde::Deserialize;

use crate::adapters::{clamp_page_size, normalize_all, parse_timestamp, RawArticle};
use crate::config::SourceSettings;
use crate::http_client::{HttpClient, HttpMethod};
use crate::source::{SourceAdapter, SourceError, SourceFuture};
use crate::transport::{AuthConfig, ClientConfig, TransportClient};
use crate::{DateRange, NormalizedItem, SourceId, ValidationError};

/// Placeholder title NewsAPI uses for articles pulled by the publisher.
const REMOVED_TITLE: &str = "[Removed]";
const DEFAULT_CATEGORY: &str = "business";

/// NewsAPI (`newsapi.org/v2`) adapter.
///
/// Latest items come from `top-headlines`; search and date ranges use
/// `everything`, scoped to the adapter's category keyword for ranges.
#[derive(Debug)]
pub struct NewsApiAdapter {
    transport: TransportClient,
    category: String,
    language: String,
}

impl NewsApiAdapter {
    pub fn new(settings: &SourceSettings) -> Result<Self, ValidationError> {
        Ok(Self::with_transport(TransportClient::new(Self::client_config(settings))?))
    }

    pub fn with_http_client(
        settings: &SourceSettings,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ValidationError> {
        Ok(Self::with_transport(TransportClient::with_http_client(
            Self::client_config(settings),
            http,
        )?))
    }

    pub fn with_transport(transport: TransportClient) -> Self {
        Self {
            transport,
            category: String::from(DEFAULT_CATEGORY),
            language: String::from("en"),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// NewsAPI accepts the key as a bearer token.
    pub fn client_config(settings: &SourceSettings) -> ClientConfig {
        let auth = settings
            .api_key
            .clone()
            .map(AuthConfig::ApiKey)
            .unwrap_or_default();
        ClientConfig::new(settings.base_url.as_str())
            .with_auth(auth)
            .with_rate_limit(settings.rate_limit)
    }

    async fn fetch(
        &self,
        path: &str,
        params: &[(&str, &str)],
        limit: usize,
    ) -> Result<Vec<NormalizedItem>, SourceError> {
        let response = self
            .transport
            .request(HttpMethod::Get, path, params, None)
            .await?;

        let payload: NewsApiResponse = serde_json::from_str(&response.body)
            .map_err(|e| SourceError::parse(format!("failed to parse newsapi response: {e}")))?;

        if payload.status != "ok" {
            return Err(SourceError::upstream(
                format!(
                    "newsapi returned status '{}': {}",
                    payload.status,
                    payload.message.unwrap_or_default()
                ),
                false,
            ));
        }

        let source = self.id();
        let category = self.category.as_str();
        let articles = payload
            .articles
            .into_iter()
            .filter(|article| article.title.as_deref() != Some(REMOVED_TITLE))
            .map(|article| article.into_raw(category));

        Ok(normalize_all(&source, articles, limit))
    }
}

impl SourceAdapter for NewsApiAdapter {
    fn id(&self) -> SourceId {
        SourceId::newsapi()
    }

    fn fetch_latest(&self, limit: usize) -> SourceFuture<'_> {
        Box::pin(async move {
            let page_size = clamp_page_size(limit);
            self.fetch(
                "top-headlines",
                &[
                    ("category", self.category.as_str()),
                    ("language", self.language.as_str()),
                    ("pageSize", page_size.as_str()),
                ],
                limit,
            )
            .await
        })
    }

    fn fetch_search<'a>(&'a self, query: &'a str, limit: usize) -> SourceFuture<'a> {
        Box::pin(async move {
            let query = query.trim();
            if query.is_empty() {
                return Err(SourceError::invalid_request(
                    "newsapi search query must not be empty",
                ));
            }
            let page_size = clamp_page_size(limit);
            self.fetch(
                "everything",
                &[
                    ("q", query),
                    ("language", self.language.as_str()),
                    ("sortBy", "publishedAt"),
                    ("pageSize", page_size.as_str()),
                ],
                limit,
            )
            .await
        })
    }

    fn fetch_range(&self, range: DateRange, limit: usize) -> SourceFuture<'_> {
        Box::pin(async move {
            let page_size = clamp_page_size(limit);
            let from = range.start().format_rfc3339();
            let to = range.end().format_rfc3339();
            let items = self
                .fetch(
                    "everything",
                    &[
                        ("q", self.category.as_str()),
                        ("from", from.as_str()),
                        ("to", to.as_str()),
                        ("language", self.language.as_str()),
                        ("sortBy", "publishedAt"),
                        ("pageSize", page_size.as_str()),
                    ],
                    usize::MAX,
                )
                .await?;
            Ok(items
                .into_iter()
                .filter(|item| range.contains(item.published_at))
                .take(limit)
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    source: Option<NewsApiSourceRef>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSourceRef {
    name: Option<String>,
}

impl NewsApiArticle {
    fn into_raw(self, category: &str) -> RawArticle {
        let mut categories = vec![category.to_string()];
        categories.extend(self.source.and_then(|source| source.name));

        RawArticle {
            upstream_id: None,
            published_at: parse_timestamp(self.published_at.as_deref()),
            body: self
                .description
                .filter(|text| !text.trim().is_empty())
                .or(self.content),
            title: self.title,
            url: self.url,
            categories,
        }
    }
}
