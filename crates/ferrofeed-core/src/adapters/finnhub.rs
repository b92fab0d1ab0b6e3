use std::sync::Arc;

use serde::Deserialize;

use crate::adapters::{normalize_all, RawArticle};
use crate::config::SourceSettings;
use crate::http_client::{HttpClient, HttpMethod};
use crate::source::{SourceAdapter, SourceError, SourceFuture};
use crate::transport::{ClientConfig, HeaderInjector, TransportClient};
use crate::{DateRange, NormalizedItem, SourceId, UtcDateTime, ValidationError};

const TOKEN_HEADER: &str = "x-finnhub-token";
const COMPANY_NEWS_LOOKBACK_DAYS: i64 = 7;

/// Finnhub (`finnhub.io/api/v1`) market-news adapter.
///
/// Finnhub has no keyword search: ticker-like queries (`AAPL`, `BRK.B`) use
/// `company-news` over the last week, anything else filters the general feed.
/// Date ranges also filter the general feed client-side.
#[derive(Debug)]
pub struct FinnhubAdapter {
    transport: TransportClient,
    category: String,
}

impl FinnhubAdapter {
    pub fn new(settings: &SourceSettings) -> Result<Self, ValidationError> {
        Self::with_http_client(settings, Arc::new(crate::http_client::ReqwestHttpClient::new()))
    }

    pub fn with_http_client(
        settings: &SourceSettings,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ValidationError> {
        let mut transport =
            TransportClient::with_http_client(Self::client_config(settings), http)?;
        if let Some(token) = &settings.api_key {
            transport = transport.with_request_transform(HeaderInjector::new(TOKEN_HEADER, token));
        }
        Ok(Self::with_transport(transport))
    }

    pub fn with_transport(transport: TransportClient) -> Self {
        Self {
            transport,
            category: String::from("general"),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Transport settings without the token, which is injected per request.
    pub fn client_config(settings: &SourceSettings) -> ClientConfig {
        ClientConfig::new(settings.base_url.as_str()).with_rate_limit(settings.rate_limit)
    }

    async fn fetch(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<RawArticle>, SourceError> {
        let response = self
            .transport
            .request(HttpMethod::Get, path, params, None)
            .await?;

        let payload: Vec<FinnhubArticle> = serde_json::from_str(&response.body)
            .map_err(|e| SourceError::parse(format!("failed to parse finnhub response: {e}")))?;

        Ok(payload.into_iter().map(FinnhubArticle::into_raw).collect())
    }

    async fn general_news(&self) -> Result<Vec<RawArticle>, SourceError> {
        self.fetch("news", &[("category", self.category.as_str())])
            .await
    }

    async fn company_news(&self, symbol: &str) -> Result<Vec<RawArticle>, SourceError> {
        let today = UtcDateTime::now().into_inner();
        let from = calendar_date(today - time::Duration::days(COMPANY_NEWS_LOOKBACK_DAYS));
        let to = calendar_date(today);
        self.fetch(
            "company-news",
            &[("symbol", symbol), ("from", from.as_str()), ("to", to.as_str())],
        )
        .await
    }

    fn normalize(&self, articles: Vec<RawArticle>, limit: usize) -> Vec<NormalizedItem> {
        let mut items = normalize_all(&self.id(), articles, usize::MAX);
        items.sort_by(|left, right| right.published_at.cmp(&left.published_at));
        items.truncate(limit);
        items
    }
}

impl SourceAdapter for FinnhubAdapter {
    fn id(&self) -> SourceId {
        SourceId::finnhub()
    }

    fn fetch_latest(&self, limit: usize) -> SourceFuture<'_> {
        Box::pin(async move {
            let articles = self.general_news().await?;
            Ok(self.normalize(articles, limit))
        })
    }

    fn fetch_search<'a>(&'a self, query: &'a str, limit: usize) -> SourceFuture<'a> {
        Box::pin(async move {
            let query = query.trim();
            if query.is_empty() {
                return Err(SourceError::invalid_request(
                    "finnhub search query must not be empty",
                ));
            }

            if is_ticker(query) {
                let articles = self.company_news(query).await?;
                return Ok(self.normalize(articles, limit));
            }

            let needle = query.to_lowercase();
            let articles = self.general_news().await?;
            let matching = self
                .normalize(articles, usize::MAX)
                .into_iter()
                .filter(|item| {
                    item.title.to_lowercase().contains(&needle)
                        || item.body.to_lowercase().contains(&needle)
                        || item.has_category(query)
                })
                .take(limit)
                .collect();
            Ok(matching)
        })
    }

    fn fetch_range(&self, range: DateRange, limit: usize) -> SourceFuture<'_> {
        Box::pin(async move {
            let articles = self.general_news().await?;
            Ok(self
                .normalize(articles, usize::MAX)
                .into_iter()
                .filter(|item| range.contains(item.published_at))
                .take(limit)
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    id: Option<i64>,
    category: Option<String>,
    datetime: Option<i64>,
    headline: Option<String>,
    summary: Option<String>,
    url: Option<String>,
    related: Option<String>,
}

impl FinnhubArticle {
    fn into_raw(self) -> RawArticle {
        let mut categories: Vec<String> = self.category.into_iter().collect();
        if let Some(related) = &self.related {
            categories.extend(related.split(',').map(str::to_string));
        }

        RawArticle {
            upstream_id: self.id.map(|id| id.to_string()),
            title: self.headline,
            body: self.summary,
            url: self.url,
            // Finnhub reports 0 for items it has no publish time for.
            published_at: self
                .datetime
                .filter(|seconds| *seconds > 0)
                .and_then(|seconds| UtcDateTime::from_unix_seconds(seconds).ok()),
            categories,
        }
    }
}

fn is_ticker(query: &str) -> bool {
    let len = query.len();
    (1..=6).contains(&len)
        && query.starts_with(|c: char| c.is_ascii_uppercase())
        && query
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.')
}

fn calendar_date(value: time::OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        value.year(),
        u8::from(value.month()),
        value.day()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_items_map_ids_tickers_and_unix_times() {
        let payload: Vec<FinnhubArticle> = serde_json::from_str(
            r#"[
                {"category":"top news","datetime":1709280000,"headline":"Apple beats earnings","id":7290123,"image":"","related":"AAPL,MSFT","source":"Reuters","summary":"Strong quarter","url":"https://f.test/1"},
                {"category":"general","datetime":0,"headline":"Undated","id":7290124,"related":"","source":"Wire","summary":"","url":"https://f.test/2"}
            ]"#,
        )
        .expect("parses");

        let items = normalize_all(
            &SourceId::finnhub(),
            payload.into_iter().map(FinnhubArticle::into_raw),
            10,
        );

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "finnhub:7290123");
        assert_eq!(items[0].published_at.format_rfc3339(), "2024-03-01T08:00:00Z");
        assert_eq!(items[0].categories, vec!["top news", "AAPL", "MSFT"]);
    }

    #[test]
    fn ticker_detection() {
        assert!(is_ticker("AAPL"));
        assert!(is_ticker("BRK.B"));
        assert!(!is_ticker("aapl"));
        assert!(!is_ticker("rate hike"));
        assert!(!is_ticker("TOOLONGX"));
    }

    #[test]
    fn calendar_dates_are_zero_padded() {
        let value = UtcDateTime::parse("2024-03-05T23:59:59Z")
            .expect("parses")
            .into_inner();
        assert_eq!(calendar_date(value), "2024-03-05");
    }
}
