use std::sync::Arc;

use serde::Deserialize;

use crate::adapters::{clamp_page_size, normalize_all, parse_timestamp, RawArticle};
use crate::config::SourceSettings;
use crate::http_client::{HttpClient, HttpMethod, ReqwestHttpClient};
use crate::source::{SourceAdapter, SourceError, SourceFuture};
use crate::transport::{ClientConfig, QueryParamInjector, TransportClient};
use crate::{DateRange, NormalizedItem, SourceId, ValidationError};

/// GNews (`gnews.io/api/v4`) adapter. The key travels as the `apikey`
/// query parameter.
#[derive(Debug)]
pub struct GNewsAdapter {
    transport: TransportClient,
    category: String,
    language: String,
}

impl GNewsAdapter {
    pub fn new(settings: &SourceSettings) -> Result<Self, ValidationError> {
        Self::with_http_client(settings, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(
        settings: &SourceSettings,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ValidationError> {
        let mut transport =
            TransportClient::with_http_client(Self::client_config(settings), http)?;
        if let Some(key) = &settings.api_key {
            transport = transport.with_request_transform(QueryParamInjector::new("apikey", key));
        }
        Ok(Self::with_transport(transport))
    }

    pub fn with_transport(transport: TransportClient) -> Self {
        Self {
            transport,
            category: String::from("business"),
            language: String::from("en"),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn client_config(settings: &SourceSettings) -> ClientConfig {
        ClientConfig::new(settings.base_url.as_str()).with_rate_limit(settings.rate_limit)
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

        let payload: GNewsResponse = serde_json::from_str(&response.body)
            .map_err(|e| SourceError::parse(format!("failed to parse gnews response: {e}")))?;

        let category = self.category.as_str();
        Ok(normalize_all(
            &self.id(),
            payload
                .articles
                .into_iter()
                .map(|article| article.into_raw(category)),
            limit,
        ))
    }
}

impl SourceAdapter for GNewsAdapter {
    fn id(&self) -> SourceId {
        SourceId::gnews()
    }

    fn fetch_latest(&self, limit: usize) -> SourceFuture<'_> {
        Box::pin(async move {
            let max = clamp_page_size(limit);
            self.fetch(
                "top-headlines",
                &[
                    ("category", self.category.as_str()),
                    ("lang", self.language.as_str()),
                    ("max", max.as_str()),
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
                    "gnews search query must not be empty",
                ));
            }
            let max = clamp_page_size(limit);
            self.fetch(
                "search",
                &[
                    ("q", query),
                    ("lang", self.language.as_str()),
                    ("sortby", "publishedAt"),
                    ("max", max.as_str()),
                ],
                limit,
            )
            .await
        })
    }

    fn fetch_range(&self, range: DateRange, limit: usize) -> SourceFuture<'_> {
        Box::pin(async move {
            let max = clamp_page_size(limit);
            let from = range.start().format_rfc3339();
            let to = range.end().format_rfc3339();
            let items = self
                .fetch(
                    "top-headlines",
                    &[
                        ("category", self.category.as_str()),
                        ("lang", self.language.as_str()),
                        ("from", from.as_str()),
                        ("to", to.as_str()),
                        ("max", max.as_str()),
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
struct GNewsResponse {
    #[serde(default)]
    articles: Vec<GNewsArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GNewsArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source: Option<GNewsSourceRef>,
}

#[derive(Debug, Deserialize)]
struct GNewsSourceRef {
    name: Option<String>,
}

impl GNewsArticle {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_items_are_normalized_with_url_hash_ids() {
        let payload: GNewsResponse = serde_json::from_str(
            r#"{
                "totalArticles": 2,
                "articles": [
                    {"title": " Markets rally ", "description": "", "content": "Stocks rose sharply.", "url": "https://g.test/a", "image": null, "publishedAt": "2024-03-01T09:30:00+01:00", "source": {"name": "Wire", "url": "https://g.test"}},
                    {"title": "Broken", "url": "https://g.test/b", "publishedAt": "not a date"}
                ]
            }"#,
        )
        .expect("parses");

        let items = normalize_all(
            &SourceId::gnews(),
            payload.articles.into_iter().map(|a| a.into_raw("business")),
            10,
        );

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.title, "Markets rally");
        assert_eq!(item.body, "Stocks rose sharply.");
        assert_eq!(item.published_at.format_rfc3339(), "2024-03-01T08:30:00Z");
        assert!(item.id.starts_with("gnews:"));
        assert_eq!(item.categories, vec!["business", "Wire"]);
    }
}
